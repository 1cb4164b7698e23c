use banter_net::NetError;
use banter_shared::ChannelId;
use thiserror::Error;

use crate::uploads::UploadError;

/// Errors produced by the synchronization engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// An attachment upload failed; nothing was sent.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// A message was handed over with an attachment that still points at a
    /// local file.
    #[error("Message has an unresolved attachment")]
    UnresolvedAttachment,

    /// The addressed channel is not in the registry.
    #[error("Unknown channel {0}")]
    UnknownChannel(ChannelId),

    /// The transport refused or lost the link.
    #[error("Transport error: {0}")]
    Transport(#[from] NetError),

    /// The engine task is gone; commands and queries can no longer be
    /// answered.
    #[error("Sync engine closed")]
    EngineClosed,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
