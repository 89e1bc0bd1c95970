//! Chat transport abstraction.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{IncomingMessage, OutgoingMessage};

/// A bidirectional chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Start receiving. Inbound messages arrive on the returned receiver,
    /// which closes when the transport shuts down.
    async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>>;

    /// Deliver one reply.
    async fn send(&self, message: OutgoingMessage) -> Result<()>;
}
