use thiserror::Error;

/// Errors produced by the transport layer.
#[derive(Error, Debug)]
pub enum NetError {
    /// The dial or handshake failed.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// An operation needed a live link and there was none.
    #[error("Not connected")]
    NotConnected,

    /// The link existed but its event channel has closed underneath us.
    #[error("Event channel closed")]
    ChannelClosed,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NetError>;
