//! Transport abstraction underneath the session.
//!
//! The session works against text frames; the typed codec lives one layer
//! up, so every channel implementation stays a dumb pipe. Swapping the
//! WebSocket connector for the in-memory one is how the higher layers are
//! tested without a server.

use async_trait::async_trait;

use crate::error::NetError;

/// A live bidirectional text-frame channel to the server.
#[async_trait]
pub trait EventChannel: Send {
    /// Ship one frame to the server.
    async fn send(&mut self, frame: String) -> Result<(), NetError>;

    /// Next inbound frame; `None` once the link is gone.
    async fn recv(&mut self) -> Option<String>;

    /// Best-effort close handshake. Dropping the channel afterwards is fine.
    async fn close(&mut self);
}

/// Opens event channels. One connector can be asked to connect any number
/// of times; each call yields an independent channel.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn EventChannel>, NetError>;
}
