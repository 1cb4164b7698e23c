//! Domain models synchronized from the workspace server.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can cross the
//! event stream as-is and be handed to the UI layer inside snapshots.
//! Field names follow the server's camelCase JSON convention.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, GroupId, MessageId, UserId, WorkspaceId};

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// Workspace metadata. Singleton per session; mutated only through the
/// workspace HTTP API, never by stream events, and never deleted client-side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub owner_id: UserId,
    pub avatar_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// What kind of conversation a channel is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Multi-member channel under a channel group.
    Group,
    /// 1:1 conversation with a single other member.
    Direct,
    /// The synthesized private self-notes channel.
    Notes,
}

/// A named conversation scope containing an ordered message timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub owner_id: UserId,
    /// When set, only the channel owner may post (see the access gate).
    pub readonly: bool,
    pub kind: ChannelKind,
    /// The other member of a 1:1 channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_user: Option<UserId>,
    /// Membership is presence in this set; join/leave events mutate it.
    #[serde(default)]
    pub members: HashSet<UserId>,
}

impl Channel {
    /// Synthesize the per-session Notes channel for `owner`.
    ///
    /// Exactly one exists per workspace session. Its id is client-generated,
    /// so remote rename/delete events can never target it.
    pub fn notes(owner: UserId) -> Self {
        let mut members = HashSet::new();
        members.insert(owner.clone());
        Self {
            id: ChannelId::new(),
            name: "Notes".to_string(),
            owner_id: owner,
            readonly: false,
            kind: ChannelKind::Notes,
            direct_user: None,
            members,
        }
    }
}

/// An ordered collection of channels under one navigational heading.
/// Order is display-significant and server-assigned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelGroup {
    pub id: GroupId,
    pub name: String,
    pub channels: Vec<Channel>,
}

/// Weak reference to the active channel: an id plus a cached display name,
/// never an owning handle into the registry. The referenced channel may be
/// deleted remotely at any time, in which case the holder redirects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentChannel {
    pub id: ChannelId,
    pub name: String,
}

impl CurrentChannel {
    pub fn of(channel: &Channel) -> Self {
        Self {
            id: channel.id.clone(),
            name: channel.name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    /// Tombstone marker; deleted messages keep their timeline position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Timeline ordering key: `created_at` with the id breaking ties, so
    /// messages with equal timestamps (clock skew) still order total.
    pub fn sort_key(&self) -> (DateTime<Utc>, MessageId) {
        (self.created_at, self.id.clone())
    }

    /// Whether every attachment carries a durable remote reference.
    /// A message may only be dispatched once this holds.
    pub fn attachments_resolved(&self) -> bool {
        self.attachments.iter().all(Attachment::is_resolved)
    }
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

/// Where an attachment's bytes currently live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AttachmentSource {
    /// Not yet uploaded; a path on the local filesystem.
    Local { path: PathBuf },
    /// Durable reference returned by the upload service.
    Remote { url: String },
}

/// A file attached to a message. Before send it exists only as a local
/// reference; the upload pipeline replaces the source with a remote one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    pub source: AttachmentSource,
}

impl Attachment {
    /// Build a not-yet-uploaded attachment from a local file path.
    /// The display name is derived from the final path component.
    pub fn local(path: impl Into<PathBuf>, mime_type: impl Into<String>, size: u64) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        Self {
            file_name,
            mime_type: mime_type.into(),
            size,
            source: AttachmentSource::Local { path },
        }
    }

    /// Whether this attachment already carries a durable remote reference.
    pub fn is_resolved(&self) -> bool {
        matches!(self.source, AttachmentSource::Remote { .. })
    }

    /// The remote URL, when resolved.
    pub fn remote_url(&self) -> Option<&str> {
        match &self.source {
            AttachmentSource::Remote { url } => Some(url),
            AttachmentSource::Local { .. } => None,
        }
    }

    /// Consume this attachment and return the resolved version pointing at
    /// `url`, preserving name, mime type and size.
    pub fn into_resolved(self, url: impl Into<String>) -> Self {
        Self {
            source: AttachmentSource::Remote { url: url.into() },
            ..self
        }
    }
}
