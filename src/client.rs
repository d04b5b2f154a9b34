use std::{
    io,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::net::{lookup_host, TcpStream};
use tonic::{
    codegen::InterceptedService,
    metadata::{Ascii, MetadataValue},
    service::Interceptor,
    transport::{Channel, ClientTlsConfig, Endpoint, Uri},
    Request, Status,
};
use tower::service_fn;
use tracing::{debug, info};

use crate::{
    config::{Credentials, RunConfig, AMBIENT_TOKEN_ENV},
    error::RpcError,
    path::{peer_string, DirectPathMatcher},
    proto::storage::v1::storage_client::StorageClient,
};

/// The storage client used by the benchmark: one channel, bearer auth on every call.
pub type StorageStub = StorageClient<InterceptedService<Channel, BearerAuth>>;

/// Where to connect, parsed from the `--host` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Whether the channel is wrapped in TLS.
    pub tls: bool,
    /// Host name or address, IPv6 literals kept in brackets.
    pub host: String,
    pub port: u16,
}

impl Target {
    /// Parse `dns:///host:port`, `dns:host:port`, `host[:port]`,
    /// `https://host[:port]` or `http://host[:port]`.
    ///
    /// Only `http://` yields a plaintext target.
    pub fn parse(raw: &str) -> Result<Self, RpcError> {
        let invalid = |reason: String| RpcError::InvalidTarget {
            host: raw.to_string(),
            reason,
        };

        let (tls, rest) = if let Some(rest) = raw.strip_prefix("http://") {
            (false, rest)
        } else if let Some(rest) = raw.strip_prefix("https://") {
            (true, rest)
        } else if let Some(rest) = raw.strip_prefix("dns:///") {
            (true, rest)
        } else if let Some(rest) = raw.strip_prefix("dns:") {
            (true, rest)
        } else {
            (true, raw)
        };
        let rest = rest.trim_end_matches('/');
        if rest.is_empty() {
            return Err(invalid("missing host".to_string()));
        }

        let scheme = if tls { "https" } else { "http" };
        let uri = format!("{}://{}", scheme, rest)
            .parse::<Uri>()
            .map_err(|err| invalid(err.to_string()))?;
        if uri.path() != "/" || uri.query().is_some() {
            return Err(invalid("unexpected path".to_string()));
        }
        let host = uri
            .host()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("missing host".to_string()))?;
        let authority = uri.authority().map(|a| a.as_str()).unwrap_or_default();
        if authority.contains('@') {
            return Err(invalid("unexpected user info".to_string()));
        }
        // The authority parser accepts any port text, so check it here.
        let port = match authority
            .strip_prefix(host)
            .and_then(|rest| rest.strip_prefix(':'))
        {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| invalid(format!("invalid port {:?}", port)))?,
            None => {
                if tls {
                    443
                } else {
                    80
                }
            }
        };

        Ok(Self {
            tls,
            host: host.to_string(),
            port,
        })
    }

    /// `host:port`, suitable for name resolution.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Host without IPv6 brackets, used as the TLS server name.
    pub fn domain(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    pub fn uri(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}", scheme, self.authority())
    }
}

/// Call credential attaching `authorization: Bearer <token>` to every request.
#[derive(Clone, Default)]
pub struct BearerAuth {
    header: Option<MetadataValue<Ascii>>,
}

impl BearerAuth {
    pub fn new(token: &str) -> Result<Self, RpcError> {
        let header = format!("Bearer {}", token)
            .parse::<MetadataValue<Ascii>>()
            .map_err(|_| RpcError::InvalidToken)?;
        Ok(Self {
            header: Some(header),
        })
    }

    /// Pick the call credential for `credentials`.
    ///
    /// Ambient credentials use `GCP_AUTH_TOKEN` when it is set and send
    /// nothing otherwise.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self, RpcError> {
        match credentials {
            Credentials::AccessToken(token) => Self::new(token),
            Credentials::Ambient => match std::env::var(AMBIENT_TOKEN_ENV) {
                Ok(token) if !token.is_empty() => {
                    debug!("Using bearer token from {}", AMBIENT_TOKEN_ENV);
                    Self::new(&token)
                }
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.header.is_none()
    }
}

impl Interceptor for BearerAuth {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(header) = &self.header {
            request
                .metadata_mut()
                .insert("authorization", header.clone());
        }
        Ok(request)
    }
}

/// Remembers the socket address the channel last connected to.
///
/// The connector updates it on every (re)connect, so after a call it names
/// the peer that served the call.
#[derive(Debug, Clone, Default)]
pub struct PeerTracker {
    last: Arc<Mutex<Option<SocketAddr>>>,
}

impl PeerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, addr: SocketAddr) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(addr);
    }

    pub fn current(&self) -> Option<SocketAddr> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current peer rendered like a gRPC peer string, or `unknown`.
    pub fn peer(&self) -> String {
        self.current()
            .map(|addr| peer_string(&addr))
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Resolve the target and connect to the first reachable address.
///
/// `steer` is `Some(directpath)` when candidates should be ordered for the
/// accelerated path and `None` to dial them in resolver order.
async fn dial(
    target: Target,
    steer: Option<bool>,
    matcher: DirectPathMatcher,
    peers: PeerTracker,
) -> io::Result<TcpStream> {
    let resolved: Vec<SocketAddr> = lookup_host(target.authority()).await?.collect();
    debug!("Resolved {} to {:?}", target.authority(), resolved);
    let candidates = match steer {
        Some(directpath) => matcher.order_candidates(resolved, directpath),
        None => resolved,
    };

    let mut last_err = None;
    for addr in candidates {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                debug!("Connected to {}", peer_string(&addr));
                peers.set(addr);
                return Ok(stream);
            }
            Err(err) => {
                debug!("Failed to connect to {}: {:?}", addr, err);
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} resolved to no addresses", target.authority()),
        )
    }))
}

/// Build the single channel shared by every run.
///
/// An explicit token gets TLS plus the bearer credential. Ambient
/// credentials additionally steer address selection: DirectPath addresses
/// are preferred when allowed and skipped when not.
pub async fn connect(config: &RunConfig, peers: PeerTracker) -> Result<StorageStub, RpcError> {
    let target = Target::parse(&config.host)?;
    let auth = BearerAuth::from_credentials(&config.credentials)?;

    let mut endpoint = Endpoint::from_shared(target.uri()).map_err(|err| RpcError::InvalidTarget {
        host: config.host.clone(),
        reason: err.to_string(),
    })?;
    if target.tls {
        endpoint = endpoint.tls_config(ClientTlsConfig::new().domain_name(target.domain()))?;
    }

    let steer = match config.credentials {
        Credentials::AccessToken(_) => None,
        Credentials::Ambient => Some(config.directpath),
    };
    info!(
        "Connecting to {} (tls: {}, anonymous: {}, directpath: {})",
        target.authority(),
        target.tls,
        auth.is_anonymous(),
        config.directpath
    );

    let matcher = config.directpath_matcher.clone();
    let channel = endpoint
        .connect_with_connector(service_fn(move |_: Uri| {
            dial(target.clone(), steer, matcher.clone(), peers.clone())
        }))
        .await?;

    Ok(StorageClient::with_interceptor(channel, auth))
}
