//! Per-channel message timelines: optimistic local sends reconciled against
//! server echoes.
//!
//! Every entry carries a delivery state. A locally staged message starts
//! Pending under a client-generated correlation id; the server echo with the
//! same correlation promotes it in place, swapping in the server-assigned
//! message id. Deleted messages become tombstones so surrounding ordering
//! never shifts underneath in-flight edits.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use banter_shared::models::{Attachment, Message};
use banter_shared::{ChannelId, CorrelationId, MessageId, UserId};

use crate::error::SyncError;

/// Delivery state of one timeline entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Optimistically inserted, awaiting the server echo.
    Pending { correlation: CorrelationId },
    /// Acknowledged by the server.
    Confirmed,
    /// The transport rejected the send; retriable.
    Failed { correlation: CorrelationId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub message: Message,
    pub delivery: Delivery,
}

/// One channel's ordered message sequence.
#[derive(Debug, Default)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    /// Entries in `(created_at, id)` order, tombstones included.
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.entries.iter().position(|e| e.message.id == *id)
    }

    // A Failed entry keeps its correlation so a late echo can still claim
    // it; the send may have reached the server even when the local link
    // died first.
    fn position_by_correlation(&self, correlation: &CorrelationId) -> Option<usize> {
        self.entries.iter().position(|e| match &e.delivery {
            Delivery::Pending { correlation: c } | Delivery::Failed { correlation: c } => {
                c == correlation
            }
            Delivery::Confirmed => false,
        })
    }

    fn insert_ordered(&mut self, entry: TimelineEntry) {
        let key = entry.message.sort_key();
        let at = self.entries.partition_point(|e| e.message.sort_key() <= key);
        self.entries.insert(at, entry);
    }
}

/// All timelines of the session, keyed by channel.
#[derive(Debug, Default)]
pub struct Timelines {
    by_channel: HashMap<ChannelId, Timeline>,
}

impl Timelines {
    /// The timeline of `id`; empty when the channel never saw a message.
    pub fn channel(&self, id: &ChannelId) -> &[TimelineEntry] {
        self.by_channel.get(id).map(|t| t.entries()).unwrap_or(&[])
    }

    fn timeline(&mut self, id: &ChannelId) -> &mut Timeline {
        self.by_channel.entry(id.clone()).or_default()
    }

    /// Stage an optimistic send: the message appears Pending immediately,
    /// tagged with a fresh correlation id for the echo to claim. Fails when
    /// any attachment still points at a local file.
    pub fn stage_send(
        &mut self,
        channel_id: &ChannelId,
        author: UserId,
        body: String,
        attachments: Vec<Attachment>,
    ) -> Result<(CorrelationId, Message), SyncError> {
        if attachments.iter().any(|a| !a.is_resolved()) {
            return Err(SyncError::UnresolvedAttachment);
        }
        let message = Message {
            id: MessageId::new(),
            channel_id: channel_id.clone(),
            author_id: author,
            body,
            attachments,
            created_at: Utc::now(),
            edited_at: None,
            deleted_at: None,
        };
        let correlation = CorrelationId::new();
        self.timeline(channel_id).insert_ordered(TimelineEntry {
            message: message.clone(),
            delivery: Delivery::Pending {
                correlation: correlation.clone(),
            },
        });
        Ok((correlation, message))
    }

    /// Reconcile a message pushed by the server. A matching correlation
    /// promotes the optimistic entry in place (server id and timestamps win,
    /// position follows the ordering key); a known id is a redelivery and
    /// changes nothing; anything else inserts as Confirmed in order.
    /// Returns whether the timeline changed.
    pub fn on_server_echo(
        &mut self,
        message: Message,
        correlation: Option<CorrelationId>,
    ) -> bool {
        let channel_id = message.channel_id.clone();
        let timeline = self.timeline(&channel_id);

        if let Some(correlation) = correlation {
            if let Some(at) = timeline.position_by_correlation(&correlation) {
                debug!(channel = %channel_id, correlation = %correlation, "Echo confirmed optimistic send");
                let mut entry = timeline.entries.remove(at);
                entry.message = message;
                entry.delivery = Delivery::Confirmed;
                timeline.insert_ordered(entry);
                return true;
            }
        }

        if timeline.position(&message.id).is_some() {
            debug!(message = %message.id, "Duplicate server message ignored");
            return false;
        }
        timeline.insert_ordered(TimelineEntry {
            message,
            delivery: Delivery::Confirmed,
        });
        true
    }

    /// Apply a remote edit. Unknown channels or ids are stale references,
    /// tolerated as no-ops.
    pub fn on_edited(
        &mut self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        body: String,
        edited_at: DateTime<Utc>,
    ) -> bool {
        let timeline = match self.by_channel.get_mut(channel_id) {
            Some(timeline) => timeline,
            None => {
                debug!(channel = %channel_id, "Edit for unknown channel ignored");
                return false;
            }
        };
        match timeline.position(message_id) {
            Some(at) => {
                let entry = &mut timeline.entries[at];
                entry.message.body = body;
                entry.message.edited_at = Some(edited_at);
                true
            }
            None => {
                debug!(message = %message_id, "Edit for unknown message ignored");
                false
            }
        }
    }

    /// Tombstone a deleted message, preserving its position. Idempotent;
    /// stale references are no-ops.
    pub fn on_deleted(&mut self, channel_id: &ChannelId, message_id: &MessageId) -> bool {
        let timeline = match self.by_channel.get_mut(channel_id) {
            Some(timeline) => timeline,
            None => {
                debug!(channel = %channel_id, "Delete for unknown channel ignored");
                return false;
            }
        };
        match timeline.position(message_id) {
            Some(at) => {
                let entry = &mut timeline.entries[at];
                if entry.message.deleted_at.is_some() {
                    return false;
                }
                entry.message.deleted_at = Some(Utc::now());
                true
            }
            None => {
                debug!(message = %message_id, "Delete for unknown message ignored");
                false
            }
        }
    }

    /// Flip a Pending entry to Failed so the user sees the send did not go
    /// through.
    pub fn mark_failed(&mut self, channel_id: &ChannelId, correlation: &CorrelationId) -> bool {
        let timeline = match self.by_channel.get_mut(channel_id) {
            Some(timeline) => timeline,
            None => return false,
        };
        for entry in &mut timeline.entries {
            if entry.delivery == (Delivery::Pending { correlation: correlation.clone() }) {
                entry.delivery = Delivery::Failed {
                    correlation: correlation.clone(),
                };
                return true;
            }
        }
        false
    }

    /// Put a Failed entry back to Pending and hand out the message for
    /// re-dispatch. The correlation id is reused so the eventual echo still
    /// matches.
    pub fn retry(
        &mut self,
        channel_id: &ChannelId,
        correlation: &CorrelationId,
    ) -> Option<Message> {
        let timeline = self.by_channel.get_mut(channel_id)?;
        for entry in &mut timeline.entries {
            if entry.delivery == (Delivery::Failed { correlation: correlation.clone() }) {
                entry.delivery = Delivery::Pending {
                    correlation: correlation.clone(),
                };
                return Some(entry.message.clone());
            }
        }
        None
    }

    /// Fail every Pending entry, reporting which ones flipped. Used when the
    /// link drops: anything unacknowledged is presumed lost and left for the
    /// user to retry.
    pub fn fail_all_pending(&mut self) -> Vec<(ChannelId, CorrelationId)> {
        let mut failed = Vec::new();
        for (channel_id, timeline) in &mut self.by_channel {
            for entry in &mut timeline.entries {
                if let Delivery::Pending { correlation } = &entry.delivery {
                    let correlation = correlation.clone();
                    entry.delivery = Delivery::Failed {
                        correlation: correlation.clone(),
                    };
                    failed.push((channel_id.clone(), correlation));
                }
            }
        }
        failed
    }
}
