//! Attachment upload pipeline: local file references become durable remote
//! references before a message is allowed anywhere near the timeline.

use async_trait::async_trait;
use futures::future::try_join_all;
use thiserror::Error;
use tracing::debug;

use banter_shared::models::Attachment;

/// A single failed upload. The pipeline is all-or-nothing, so one of these
/// fails the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Upload of {file_name} failed: {reason}")]
pub struct UploadError {
    pub file_name: String,
    pub reason: String,
}

/// Uploads one attachment and returns its durable URL.
#[async_trait]
pub trait AttachmentUploader: Send + Sync {
    async fn upload(&self, attachment: &Attachment) -> Result<String, UploadError>;
}

/// Resolve a batch of attachments concurrently.
///
/// Input order is preserved; attachment order is display order. The batch
/// is all-or-nothing: one failure fails the call, and nothing from the
/// batch may be attached to a message. Already-resolved attachments pass
/// through untouched.
pub async fn process_uploads(
    uploader: &dyn AttachmentUploader,
    attachments: Vec<Attachment>,
) -> Result<Vec<Attachment>, UploadError> {
    let uploads = attachments.into_iter().map(|attachment| async move {
        if attachment.is_resolved() {
            return Ok(attachment);
        }
        let url = uploader.upload(&attachment).await?;
        debug!(file = %attachment.file_name, "Attachment resolved");
        Ok(attachment.into_resolved(url))
    });
    try_join_all(uploads).await
}
