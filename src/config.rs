use clap::{ArgAction, Parser};

use crate::path::{DirectPathMatcher, DEFAULT_DIRECTPATH_PREFIX};

pub const DEFAULT_HOST: &str = "dns:///storage.googleapis.com:443";
pub const DEFAULT_BUCKET: &str = "gcs-grpc-team-veblush1";
pub const DEFAULT_OBJECT: &str = "1G.txt";
pub const DEFAULT_RUNS: usize = 1;
pub const DEFAULT_WARMUP_RUNS: usize = 1;

/// Environment variable consulted for a bearer token when none is passed on
/// the command line.
pub const AMBIENT_TOKEN_ENV: &str = "GCP_AUTH_TOKEN";

/// Download latency and throughput benchmark for the Cloud Storage gRPC API.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct BenchArgs {
    /// Access token for auth
    #[arg(long, alias = "access_token", default_value = "")]
    pub access_token: String,

    /// Host to reach
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Bucket to fetch object from
    #[arg(long, default_value = DEFAULT_BUCKET)]
    pub bucket: String,

    /// Object to download
    #[arg(long, default_value = DEFAULT_OBJECT)]
    pub object: String,

    /// Number of measured downloads
    #[arg(long, default_value_t = DEFAULT_RUNS)]
    pub runs: usize,

    /// Number of downloads run before measuring
    #[arg(long, alias = "warmup_runs", default_value_t = DEFAULT_WARMUP_RUNS)]
    pub warmup_runs: usize,

    /// Whether to allow DirectPath, and expect every run to use it
    #[arg(
        long,
        default_value_t = true,
        num_args = 0..=1,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub directpath: bool,

    /// Peer prefix that identifies a DirectPath connection
    #[arg(long, alias = "directpath_prefix", default_value = DEFAULT_DIRECTPATH_PREFIX)]
    pub directpath_prefix: String,

    /// Show debug output and progress updates
    #[arg(
        long,
        short = 'v',
        default_value_t = false,
        num_args = 0..=1,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub verbose: bool,
}

/// How calls authenticate against the service.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Explicit OAuth2 bearer token sent with every call over TLS.
    AccessToken(String),
    /// Whatever the environment provides.
    Ambient,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessToken(_) => f.write_str("AccessToken(<redacted>)"),
            Self::Ambient => f.write_str("Ambient"),
        }
    }
}

/// Settings for one benchmark invocation. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub host: String,
    pub bucket: String,
    pub object: String,
    pub credentials: Credentials,
    pub runs: usize,
    pub warmup_runs: usize,
    pub directpath: bool,
    pub directpath_matcher: DirectPathMatcher,
    pub verbose: bool,
}

impl RunConfig {
    /// Total iterations, warmups included. Saturates instead of overflowing.
    pub fn total_runs(&self) -> usize {
        self.warmup_runs.saturating_add(self.runs)
    }

    /// Whether iteration `run` (0-based) counts towards the summary.
    pub fn is_measured(&self, run: usize) -> bool {
        run >= self.warmup_runs
    }

    /// Whether the summary table is printed at all.
    pub fn wants_summary(&self) -> bool {
        self.runs != 1
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            object: DEFAULT_OBJECT.to_string(),
            credentials: Credentials::Ambient,
            runs: DEFAULT_RUNS,
            warmup_runs: DEFAULT_WARMUP_RUNS,
            directpath: true,
            directpath_matcher: DirectPathMatcher::default(),
            verbose: false,
        }
    }
}

impl From<BenchArgs> for RunConfig {
    fn from(args: BenchArgs) -> Self {
        let credentials = if args.access_token.is_empty() {
            Credentials::Ambient
        } else {
            Credentials::AccessToken(args.access_token)
        };
        Self {
            host: args.host,
            bucket: args.bucket,
            object: args.object,
            credentials,
            runs: args.runs,
            warmup_runs: args.warmup_runs,
            directpath: args.directpath,
            directpath_matcher: DirectPathMatcher::new(args.directpath_prefix),
            verbose: args.verbose,
        }
    }
}
