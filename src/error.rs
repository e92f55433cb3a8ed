use thiserror::Error;

/// Error kinds surfaced at the library boundary (message parsing, the term
/// store, and training). The CLI wraps these in `anyhow::Result` the way the
/// rest of the ecosystem layers a typed library under an `anyhow`-flavored
/// binary.
#[derive(Debug, Error)]
pub enum MailProbeError {
    #[error("malformed message: {0}")]
    MalformedInput(String),

    #[error("term store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("transient store failure, caller may retry: {0}")]
    StoreTransient(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("message not registered")]
    NotFound,

    #[error("malformed CSV line: {0}")]
    ImportFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MailProbeError>;
