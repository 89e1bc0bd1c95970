//! Error types for the gateway.

/// Errors from the gateway loop.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("channel error: {0}")]
    Channel(String),
}
