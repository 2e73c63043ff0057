//! Error type for the pup CLI.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] pup_core::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error(
        "Sync is not configured. Set PUP_REMOTE_URL (and optionally PUP_REMOTE_TOKEN) to enable `pup sync`."
    )]
    SyncNotConfigured,
}
