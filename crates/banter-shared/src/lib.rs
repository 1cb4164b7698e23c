//! # banter-shared
//!
//! Types shared by every Banter crate: strongly-typed ids, the domain
//! models synchronized from the workspace server, the wire events exchanged
//! over the event stream, and the field validation rules enforced at the
//! workspace API boundary.

pub mod events;
pub mod models;
pub mod types;
pub mod validation;

pub use events::{ClientCommand, EventKind, ServerEvent};
pub use models::*;
pub use types::{ChannelId, CorrelationId, GroupId, MessageId, UserId, WorkspaceId};
pub use validation::FieldError;
