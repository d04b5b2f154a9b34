use std::net::SocketAddr;

/// Peer prefix of the DirectPath IPv6 range Google serves accelerated traffic from.
pub const DEFAULT_DIRECTPATH_PREFIX: &str = "ipv6:[2001:";

/// Render a connected socket address the way gRPC core reports a peer,
/// e.g. `ipv4:10.0.0.1:443` or `ipv6:[2001:db8::1]:443`.
pub fn peer_string(addr: &SocketAddr) -> String {
    match addr {
        SocketAddr::V4(v4) => format!("ipv4:{}", v4),
        SocketAddr::V6(v6) => format!("ipv6:{}", v6),
    }
}

/// Decides whether a peer was reached over the accelerated network path.
///
/// The check is a plain prefix match on the rendered peer string. It only
/// holds as long as the service keeps handing out DirectPath addresses from
/// the configured range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectPathMatcher {
    prefix: String,
}

impl DirectPathMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether `peer` looks like an accelerated-path peer.
    pub fn matches(&self, peer: &str) -> bool {
        peer.starts_with(&self.prefix)
    }

    pub fn matches_addr(&self, addr: &SocketAddr) -> bool {
        self.matches(&peer_string(addr))
    }

    /// Order dial candidates for the requested path.
    ///
    /// With `directpath` enabled accelerated addresses go first. Disabled, they
    /// are dropped, unless nothing else is left to dial.
    pub fn order_candidates(&self, addrs: Vec<SocketAddr>, directpath: bool) -> Vec<SocketAddr> {
        let (accelerated, other): (Vec<_>, Vec<_>) =
            addrs.into_iter().partition(|addr| self.matches_addr(addr));
        if directpath {
            accelerated.into_iter().chain(other).collect()
        } else if other.is_empty() {
            accelerated
        } else {
            other
        }
    }
}

impl Default for DirectPathMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DIRECTPATH_PREFIX)
    }
}
