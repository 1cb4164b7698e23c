// Client-side synchronization: channel registry, message timelines, and the
// engine task that keeps them aligned with the server.

pub mod access;
pub mod error;
pub mod registry;
pub mod session;
pub mod timeline;
pub mod uploads;

pub use access::is_readonly;
pub use error::SyncError;
pub use registry::{ChannelRegistry, RegistryChange};
pub use session::{spawn_session, SessionConfig, SyncCommand, SyncNotification, UiSnapshot};
pub use timeline::{Delivery, Timeline, TimelineEntry, Timelines};
pub use uploads::{process_uploads, AttachmentUploader, UploadError};
