use std::path::PathBuf;

/// Failures talking to the ledger explorer. These are isolated per address:
/// the fetcher tries the transfer cache, and the crawler skips the address
/// if that also misses.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("explorer returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid explorer response: {0}")]
    InvalidResponse(String),

    #[error("explorer reported failure: {0}")]
    Api(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("no checkpoint found in {}", dir.display())]
    NotFound { dir: PathBuf, step: Option<u32> },

    #[error("malformed checkpoint: {0}")]
    Malformed(String),

    #[error("checkpoint for step {step} already exists at {}", path.display())]
    Conflict { step: u32, path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("checkpoint root {found} does not match configured root {expected}")]
    RootMismatch { expected: String, found: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
