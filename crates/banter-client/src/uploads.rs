//! Attachment uploads over HTTP.
//!
//! Reads the local file and posts it as multipart form data to the
//! workspace upload endpoint, which answers with the durable URL.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use banter_shared::models::{Attachment, AttachmentSource};
use banter_sync::{AttachmentUploader, UploadError};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

pub struct HttpUploader {
    http: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpUploader {
    /// `base_url` is the workspace API base; files go to `{base}/upload`.
    pub fn new(base_url: &str, auth_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{base_url}/upload"),
            auth_token,
        }
    }

    fn error(attachment: &Attachment, reason: impl Into<String>) -> UploadError {
        UploadError {
            file_name: attachment.file_name.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl AttachmentUploader for HttpUploader {
    async fn upload(&self, attachment: &Attachment) -> Result<String, UploadError> {
        let path = match &attachment.source {
            AttachmentSource::Local { path } => path.clone(),
            // Already durable; nothing to upload.
            AttachmentSource::Remote { url } => return Ok(url.clone()),
        };

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Self::error(attachment, format!("Failed to read file: {e}")))?;

        let part = Part::bytes(bytes)
            .file_name(attachment.file_name.clone())
            .mime_str(&attachment.mime_type)
            .map_err(|e| Self::error(attachment, format!("Invalid mime type: {e}")))?;
        let form = Form::new().part("file", part);

        let mut request = self.http.post(&self.endpoint).multipart(form);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::error(attachment, e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::error(
                attachment,
                format!("Upload endpoint returned {}", response.status()),
            ));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| Self::error(attachment, format!("Malformed upload response: {e}")))?;

        debug!(file = %attachment.file_name, url = %body.url, "Attachment uploaded");
        Ok(body.url)
    }
}
