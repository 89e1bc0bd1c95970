use thiserror::Error;

/// Top-level error type for the relay.
///
/// Subsystem crates define their own error types and implement
/// `From<RelayError>` so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command execution error: {0}")]
    Executor(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<toml::de::Error> for RelayError {
    fn from(err: toml::de::Error) -> Self {
        RelayError::Config(err.to_string())
    }
}

/// A specialized `Result` type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
