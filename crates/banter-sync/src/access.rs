//! Read-only derivation for the active channel.
//!
//! Kept as a pure function of its inputs and recomputed on every relevant
//! state change, never cached: ownership, the channel flag, and the session
//! user can each change mid-session.

use banter_shared::models::Channel;
use banter_shared::UserId;

/// A channel is read-only for everyone but its owner, and only when its
/// flag is set.
pub fn is_readonly(channel: &Channel, current_user: &UserId) -> bool {
    channel.owner_id != *current_user && channel.readonly
}
