//! Channel and membership registry: the single source of truth for
//! navigation state.
//!
//! The server is authoritative, so every apply* tolerates stale targets as
//! a no-op instead of erroring; events can arrive after local state already
//! moved on (rename after delete, leave after delete). Mutators report what
//! they did so the orchestrator can turn effects into notifications.

use std::collections::HashSet;

use tracing::{debug, warn};

use banter_shared::models::{Channel, ChannelGroup, CurrentChannel};
use banter_shared::{ChannelId, UserId};

use crate::access;

/// What a registry mutation amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryChange {
    /// State changed.
    Applied,
    /// Stale or duplicate target; nothing changed.
    Ignored,
    /// State changed and the current channel was redirected to Notes.
    CurrentRedirected,
}

pub struct ChannelRegistry {
    user_id: UserId,
    groups: Vec<ChannelGroup>,
    notes: Channel,
    current: CurrentChannel,
}

impl ChannelRegistry {
    /// A fresh registry holds nothing but the synthesized Notes channel,
    /// which is also the initial current channel.
    pub fn new(user_id: UserId) -> Self {
        let notes = Channel::notes(user_id.clone());
        let current = CurrentChannel::of(&notes);
        Self {
            user_id,
            groups: Vec::new(),
            notes,
            current,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn groups(&self) -> &[ChannelGroup] {
        &self.groups
    }

    pub fn notes(&self) -> &Channel {
        &self.notes
    }

    pub fn current(&self) -> &CurrentChannel {
        &self.current
    }

    /// Resolve a channel id against the groups and the Notes channel.
    pub fn find(&self, id: &ChannelId) -> Option<&Channel> {
        if self.notes.id == *id {
            return Some(&self.notes);
        }
        self.groups
            .iter()
            .flat_map(|g| g.channels.iter())
            .find(|c| c.id == *id)
    }

    // Remote events never address the Notes channel; its id is
    // client-generated, so lookups for mutation skip it entirely.
    fn find_mut(&mut self, id: &ChannelId) -> Option<&mut Channel> {
        self.groups
            .iter_mut()
            .flat_map(|g| g.channels.iter_mut())
            .find(|c| c.id == *id)
    }

    /// Replace the registry wholesale. Duplicate channel ids across groups
    /// are dropped, first occurrence wins. The current channel survives by
    /// id when still present (its cached name is refreshed); otherwise it
    /// is redirected to Notes.
    pub fn apply_snapshot(&mut self, groups: Vec<ChannelGroup>) -> RegistryChange {
        let mut seen: HashSet<ChannelId> = HashSet::new();
        seen.insert(self.notes.id.clone());
        let mut deduped = Vec::with_capacity(groups.len());
        for mut group in groups {
            group.channels.retain(|c| {
                let fresh = seen.insert(c.id.clone());
                if !fresh {
                    warn!(channel = %c.id, "Dropping duplicate channel id in snapshot");
                }
                fresh
            });
            deduped.push(group);
        }
        self.groups = deduped;

        match self.find(&self.current.id).map(CurrentChannel::of) {
            Some(current) => {
                self.current = current;
                RegistryChange::Applied
            }
            None => {
                debug!(channel = %self.current.id, "Current channel gone from snapshot");
                self.current = CurrentChannel::of(&self.notes);
                RegistryChange::CurrentRedirected
            }
        }
    }

    /// Idempotent join: adding a member twice is a no-op.
    pub fn apply_joined(&mut self, channel_id: &ChannelId, user_id: UserId) -> RegistryChange {
        match self.find_mut(channel_id) {
            Some(channel) => {
                if channel.members.insert(user_id) {
                    RegistryChange::Applied
                } else {
                    RegistryChange::Ignored
                }
            }
            None => {
                debug!(channel = %channel_id, "Join for unknown channel ignored");
                RegistryChange::Ignored
            }
        }
    }

    /// Idempotent leave: removing a non-member is a no-op.
    pub fn apply_left(&mut self, channel_id: &ChannelId, user_id: &UserId) -> RegistryChange {
        match self.find_mut(channel_id) {
            Some(channel) => {
                if channel.members.remove(user_id) {
                    RegistryChange::Applied
                } else {
                    RegistryChange::Ignored
                }
            }
            None => {
                debug!(channel = %channel_id, "Leave for unknown channel ignored");
                RegistryChange::Ignored
            }
        }
    }

    /// Rename in place; stale ids are tolerated. Renaming the current
    /// channel refreshes the cached name.
    pub fn apply_renamed(&mut self, channel_id: &ChannelId, name: &str) -> RegistryChange {
        match self.find_mut(channel_id) {
            Some(channel) => {
                channel.name = name.to_string();
                if self.current.id == *channel_id {
                    self.current.name = name.to_string();
                }
                RegistryChange::Applied
            }
            None => {
                debug!(channel = %channel_id, "Rename for unknown channel ignored");
                RegistryChange::Ignored
            }
        }
    }

    /// Remove a channel from its group. Deleting the current channel
    /// redirects to Notes.
    pub fn apply_deleted(&mut self, channel_id: &ChannelId) -> RegistryChange {
        let mut removed = false;
        for group in &mut self.groups {
            let before = group.channels.len();
            group.channels.retain(|c| c.id != *channel_id);
            removed |= group.channels.len() != before;
        }
        if !removed {
            debug!(channel = %channel_id, "Delete for unknown channel ignored");
            return RegistryChange::Ignored;
        }
        if self.current.id == *channel_id {
            self.current = CurrentChannel::of(&self.notes);
            return RegistryChange::CurrentRedirected;
        }
        RegistryChange::Applied
    }

    /// Point the current channel somewhere else. An unknown target
    /// redirects to Notes rather than leaving a dangling reference.
    pub fn set_current(&mut self, channel_id: &ChannelId) -> RegistryChange {
        match self.find(channel_id).map(CurrentChannel::of) {
            Some(current) => {
                self.current = current;
                RegistryChange::Applied
            }
            None => {
                warn!(channel = %channel_id, "Unknown channel requested; falling back to Notes");
                self.current = CurrentChannel::of(&self.notes);
                RegistryChange::CurrentRedirected
            }
        }
    }

    /// The landing channel: the first channel in display order, Notes when
    /// the registry is empty.
    pub fn home_channel(&self) -> &Channel {
        self.groups
            .iter()
            .flat_map(|g| g.channels.iter())
            .next()
            .unwrap_or(&self.notes)
    }

    /// Access gate applied to the current channel.
    pub fn is_current_readonly(&self) -> bool {
        self.find(&self.current.id)
            .map(|c| access::is_readonly(c, &self.user_id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_shared::models::ChannelKind;
    use banter_shared::GroupId;
    use uuid::Uuid;

    fn user() -> UserId {
        UserId(Uuid::new_v4())
    }

    fn channel(name: &str, owner: &UserId) -> Channel {
        Channel {
            id: ChannelId::new(),
            name: name.into(),
            owner_id: owner.clone(),
            readonly: false,
            kind: ChannelKind::Group,
            direct_user: None,
            members: HashSet::new(),
        }
    }

    fn group(name: &str, channels: Vec<Channel>) -> ChannelGroup {
        ChannelGroup {
            id: GroupId(Uuid::new_v4()),
            name: name.into(),
            channels,
        }
    }

    #[test]
    fn fresh_registry_sits_on_notes() {
        let registry = ChannelRegistry::new(user());
        assert_eq!(registry.current().id, registry.notes().id);
        assert_eq!(registry.current().name, "Notes");
        assert!(registry.groups().is_empty());
    }

    #[test]
    fn snapshot_preserves_current_by_id_and_refreshes_its_name() {
        let owner = user();
        let mut registry = ChannelRegistry::new(owner.clone());
        let general = channel("general", &owner);
        let id = general.id.clone();
        registry.apply_snapshot(vec![group("Work", vec![general.clone()])]);
        registry.set_current(&id);

        let mut renamed = general;
        renamed.name = "general-2".into();
        let change = registry.apply_snapshot(vec![group("Work", vec![renamed])]);

        assert_eq!(change, RegistryChange::Applied);
        assert_eq!(registry.current().id, id);
        assert_eq!(registry.current().name, "general-2");
    }

    #[test]
    fn snapshot_redirects_current_when_its_channel_vanished() {
        let owner = user();
        let mut registry = ChannelRegistry::new(owner.clone());
        let general = channel("general", &owner);
        let id = general.id.clone();
        registry.apply_snapshot(vec![group("Work", vec![general])]);
        registry.set_current(&id);

        let change = registry.apply_snapshot(vec![group("Work", vec![])]);

        assert_eq!(change, RegistryChange::CurrentRedirected);
        assert_eq!(registry.current().id, registry.notes().id);
    }

    #[test]
    fn duplicate_channel_ids_keep_the_first_occurrence() {
        let owner = user();
        let mut registry = ChannelRegistry::new(owner.clone());
        let original = channel("general", &owner);
        let mut imposter = original.clone();
        imposter.name = "imposter".into();

        registry.apply_snapshot(vec![
            group("Work", vec![original.clone()]),
            group("Play", vec![imposter]),
        ]);

        let found = registry.find(&original.id).unwrap();
        assert_eq!(found.name, "general");
        assert!(registry.groups()[1].channels.is_empty());
    }

    #[test]
    fn join_and_leave_are_idempotent() {
        let owner = user();
        let member = user();
        let mut registry = ChannelRegistry::new(owner.clone());
        let general = channel("general", &owner);
        let id = general.id.clone();
        registry.apply_snapshot(vec![group("Work", vec![general])]);

        assert_eq!(
            registry.apply_joined(&id, member.clone()),
            RegistryChange::Applied
        );
        assert_eq!(
            registry.apply_joined(&id, member.clone()),
            RegistryChange::Ignored
        );
        assert_eq!(registry.apply_left(&id, &member), RegistryChange::Applied);
        assert_eq!(registry.apply_left(&id, &member), RegistryChange::Ignored);
    }

    #[test]
    fn membership_events_for_stale_channels_are_ignored() {
        let mut registry = ChannelRegistry::new(user());
        let ghost = ChannelId::new();
        assert_eq!(
            registry.apply_joined(&ghost, user()),
            RegistryChange::Ignored
        );
        assert_eq!(registry.apply_left(&ghost, &user()), RegistryChange::Ignored);
    }

    #[test]
    fn renaming_the_current_channel_refreshes_the_cached_name() {
        let owner = user();
        let mut registry = ChannelRegistry::new(owner.clone());
        let general = channel("general", &owner);
        let id = general.id.clone();
        registry.apply_snapshot(vec![group("Work", vec![general])]);
        registry.set_current(&id);

        assert_eq!(
            registry.apply_renamed(&id, "water-cooler"),
            RegistryChange::Applied
        );
        assert_eq!(registry.current().name, "water-cooler");
    }

    #[test]
    fn rename_after_delete_is_a_tolerated_no_op() {
        let owner = user();
        let mut registry = ChannelRegistry::new(owner.clone());
        let general = channel("general", &owner);
        let id = general.id.clone();
        registry.apply_snapshot(vec![group("Work", vec![general])]);

        assert_eq!(registry.apply_deleted(&id), RegistryChange::Applied);
        assert_eq!(registry.apply_renamed(&id, "late"), RegistryChange::Ignored);
        assert_eq!(registry.apply_deleted(&id), RegistryChange::Ignored);
    }

    #[test]
    fn deleting_the_current_channel_redirects_to_notes() {
        let owner = user();
        let mut registry = ChannelRegistry::new(owner.clone());
        let general = channel("general", &owner);
        let id = general.id.clone();
        registry.apply_snapshot(vec![group("Work", vec![general])]);
        registry.set_current(&id);

        assert_eq!(registry.apply_deleted(&id), RegistryChange::CurrentRedirected);
        assert_eq!(registry.current().id, registry.notes().id);
        assert!(registry.find(&id).is_none());
    }

    #[test]
    fn notes_cannot_be_renamed_or_deleted_by_events() {
        let mut registry = ChannelRegistry::new(user());
        let notes_id = registry.notes().id.clone();

        assert_eq!(
            registry.apply_renamed(&notes_id, "hijacked"),
            RegistryChange::Ignored
        );
        assert_eq!(registry.apply_deleted(&notes_id), RegistryChange::Ignored);
        assert_eq!(registry.notes().name, "Notes");
    }

    #[test]
    fn set_current_with_unknown_id_falls_back_to_notes() {
        let owner = user();
        let mut registry = ChannelRegistry::new(owner.clone());
        let general = channel("general", &owner);
        let id = general.id.clone();
        registry.apply_snapshot(vec![group("Work", vec![general])]);
        registry.set_current(&id);

        let change = registry.set_current(&ChannelId::new());
        assert_eq!(change, RegistryChange::CurrentRedirected);
        assert_eq!(registry.current().id, registry.notes().id);
    }

    #[test]
    fn home_is_the_first_channel_in_display_order() {
        let owner = user();
        let mut registry = ChannelRegistry::new(owner.clone());
        assert_eq!(registry.home_channel().id, registry.notes().id);

        let first = channel("first", &owner);
        let second = channel("second", &owner);
        let first_id = first.id.clone();
        registry.apply_snapshot(vec![
            group("Empty", vec![]),
            group("Work", vec![first, second]),
        ]);

        assert_eq!(registry.home_channel().id, first_id);
    }

    #[test]
    fn current_readonly_tracks_the_gate() {
        let owner = user();
        let visitor = user();
        let mut registry = ChannelRegistry::new(visitor);
        let mut locked = channel("announcements", &owner);
        locked.readonly = true;
        let id = locked.id.clone();
        registry.apply_snapshot(vec![group("Work", vec![locked])]);

        assert!(!registry.is_current_readonly());
        registry.set_current(&id);
        assert!(registry.is_current_readonly());
    }
}
