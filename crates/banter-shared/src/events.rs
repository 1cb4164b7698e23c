//! Wire events exchanged with the workspace server over the event stream.
//!
//! Both directions are tagged JSON (`{"type": "...", ...}`); the server is
//! authoritative, so inbound events referencing state the client no longer
//! holds are tolerated by the consumers, never rejected here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Attachment, ChannelGroup, Message};
use crate::types::{ChannelId, CorrelationId, MessageId, UserId};

/// Events pushed by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Full registry snapshot; answers `ClientCommand::FetchChannelGroups`.
    ChannelGroups { groups: Vec<ChannelGroup> },

    /// A message reached the channel. When this client originated it, the
    /// echo carries the correlation id back for optimistic-send dedup.
    MessageSent {
        message: Message,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation: Option<CorrelationId>,
    },

    /// A message body was edited.
    MessageEdited {
        message_id: MessageId,
        channel_id: ChannelId,
        body: String,
        edited_at: DateTime<Utc>,
    },

    /// A message was deleted.
    MessageDeleted {
        message_id: MessageId,
        channel_id: ChannelId,
    },

    /// A member joined a channel.
    UserJoinedChannel {
        channel_id: ChannelId,
        user_id: UserId,
    },

    /// A member left a channel.
    UserLeftChannel {
        channel_id: ChannelId,
        user_id: UserId,
    },

    /// A channel was renamed.
    ChannelRenamed { channel_id: ChannelId, name: String },

    /// A channel was deleted.
    ChannelDeleted { channel_id: ChannelId },
}

/// Discriminant of a [`ServerEvent`], used as the subscription key in the
/// transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ChannelGroups,
    MessageSent,
    MessageEdited,
    MessageDeleted,
    UserJoinedChannel,
    UserLeftChannel,
    ChannelRenamed,
    ChannelDeleted,
}

impl EventKind {
    /// Every kind, in a fixed order. Subscribers that want the whole stream
    /// register each entry under one owner.
    pub const ALL: [EventKind; 8] = [
        EventKind::ChannelGroups,
        EventKind::MessageSent,
        EventKind::MessageEdited,
        EventKind::MessageDeleted,
        EventKind::UserJoinedChannel,
        EventKind::UserLeftChannel,
        EventKind::ChannelRenamed,
        EventKind::ChannelDeleted,
    ];
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::ChannelGroups { .. } => EventKind::ChannelGroups,
            ServerEvent::MessageSent { .. } => EventKind::MessageSent,
            ServerEvent::MessageEdited { .. } => EventKind::MessageEdited,
            ServerEvent::MessageDeleted { .. } => EventKind::MessageDeleted,
            ServerEvent::UserJoinedChannel { .. } => EventKind::UserJoinedChannel,
            ServerEvent::UserLeftChannel { .. } => EventKind::UserLeftChannel,
            ServerEvent::ChannelRenamed { .. } => EventKind::ChannelRenamed,
            ServerEvent::ChannelDeleted { .. } => EventKind::ChannelDeleted,
        }
    }
}

/// Actions the client sends to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientCommand {
    /// Request a full registry snapshot.
    FetchChannelGroups,

    /// Deliver a message. Every attachment must already carry a remote
    /// reference; the correlation id comes back on the server echo.
    SendMessage {
        channel_id: ChannelId,
        correlation: CorrelationId,
        body: String,
        attachments: Vec<Attachment>,
    },

    /// Rename a channel.
    RenameChannel { channel_id: ChannelId, name: String },

    /// Delete a channel.
    DeleteChannel { channel_id: ChannelId },
}
