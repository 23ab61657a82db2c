//! Transport seam between the registry and the socket library.

use async_trait::async_trait;

use crate::error::TransportError;

/// Minimal duplex-connection surface the registry needs. The gateway
/// provides the real WebSocket-backed implementation; tests provide
/// in-memory doubles.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    /// Whether the underlying connection is still open.
    fn is_open(&self) -> bool;

    /// Send a serialized frame to the Worker.
    async fn send(&self, frame: String) -> Result<(), TransportError>;

    /// Close the connection.
    async fn close(&self);
}
