use thiserror::Error;

/// Exit code for a download that finished with a non-OK status.
pub const EXIT_DOWNLOAD_FAILURE: u8 = 1;
/// Exit code for an invalid host or credential.
pub const EXIT_INVALID_CONFIG: u8 = 2;
/// Exit code for a run that did not take the expected network path.
pub const EXIT_PATH_MISMATCH: u8 = 3;

/// Errors produced while setting up or running the benchmark.
///
/// Every variant is fatal for the current invocation; nothing is retried.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Invalid host {host:?}: {reason}")]
    InvalidTarget { host: String, reason: String },
    #[error("Access token is not a valid header value")]
    InvalidToken,
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("Download Failure!\n{}", .0.message())]
    Download(#[from] tonic::Status),
    #[error("DirectPath flag is {expected}, but using directpath is {used}\nPeer was {peer}")]
    PathMismatch {
        expected: bool,
        used: bool,
        peer: String,
    },
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

impl RpcError {
    /// The process exit code reported for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidTarget { .. } | Self::InvalidToken => EXIT_INVALID_CONFIG,
            Self::PathMismatch { .. } => EXIT_PATH_MISMATCH,
            Self::Transport(_) | Self::Download(_) | Self::Io(_) => EXIT_DOWNLOAD_FAILURE,
        }
    }
}
