//! In-memory channel pair for exercising the session and the layers above
//! it without a server. Frames still cross as JSON text, so the codec path
//! is the same one the WebSocket channel uses.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use banter_shared::{ClientCommand, ServerEvent};

use crate::channel::{Connector, EventChannel};
use crate::error::NetError;

/// Build a connector plus the listener that accepts whatever it dials.
pub fn pair() -> (MemoryConnector, MemoryListener) {
    let (conn_tx, conn_rx) = mpsc::unbounded_channel();
    let refusals = Arc::new(AtomicUsize::new(0));
    (
        MemoryConnector {
            conn_tx,
            refusals: refusals.clone(),
        },
        MemoryListener { conn_rx, refusals },
    )
}

/// Client side; each `connect` yields a fresh link.
pub struct MemoryConnector {
    conn_tx: mpsc::UnboundedSender<ServerEnd>,
    refusals: Arc<AtomicUsize>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn EventChannel>, NetError> {
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(NetError::ConnectFailed("connection refused".into()));
        }

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        self.conn_tx
            .send(ServerEnd { frame_tx, cmd_rx })
            .map_err(|_| NetError::ConnectFailed("listener gone".into()))?;
        Ok(Box::new(MemoryChannel { cmd_tx, frame_rx }))
    }
}

/// Test-harness side of the pair.
pub struct MemoryListener {
    conn_rx: mpsc::UnboundedReceiver<ServerEnd>,
    refusals: Arc<AtomicUsize>,
}

impl MemoryListener {
    /// Next accepted link, in dial order.
    pub async fn accept(&mut self) -> Option<ServerEnd> {
        self.conn_rx.recv().await
    }

    /// Make the next `n` dials fail, for exercising retry paths.
    pub fn refuse_next(&self, n: usize) {
        self.refusals.store(n, Ordering::SeqCst);
    }
}

/// Server half of an accepted link. Dropping it severs the link.
pub struct ServerEnd {
    frame_tx: mpsc::UnboundedSender<String>,
    cmd_rx: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    /// Push an event to the client.
    pub fn push(&self, event: &ServerEvent) {
        if let Ok(frame) = serde_json::to_string(event) {
            let _ = self.frame_tx.send(frame);
        }
    }

    /// Push a raw frame, valid JSON or not.
    pub fn push_frame(&self, frame: impl Into<String>) {
        let _ = self.frame_tx.send(frame.into());
    }

    /// Next decoded command from the client.
    pub async fn next_command(&mut self) -> Option<ClientCommand> {
        let frame = self.cmd_rx.recv().await?;
        serde_json::from_str(&frame).ok()
    }
}

struct MemoryChannel {
    cmd_tx: mpsc::UnboundedSender<String>,
    frame_rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl EventChannel for MemoryChannel {
    async fn send(&mut self, frame: String) -> Result<(), NetError> {
        self.cmd_tx.send(frame).map_err(|_| NetError::ChannelClosed)
    }

    async fn recv(&mut self) -> Option<String> {
        self.frame_rx.recv().await
    }

    async fn close(&mut self) {
        self.frame_rx.close();
    }
}
