//! Typed client for the workspace HTTP API.
//!
//! DTO field names follow the server's JSON exactly, mixed casing included,
//! so documents round-trip untouched. The sync engine never looks inside
//! these; they exist for the settings and onboarding surfaces.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the workspace API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server rejected the request and said why.
    #[error("{0}")]
    Rejected(String),
    /// Failure below the API surface: connect, TLS, request build.
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// The workspace profile document.
///
/// `pfp_url` stays snake_case on the wire, unlike the rest of the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_space_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_templates: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, rename = "pfp_url", skip_serializing_if = "Option::is_none")]
    pub pfp_url: Option<String>,
}

/// A workspace member's profile as the directory endpoint returns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pfp_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

pub struct WorkspaceApi {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl WorkspaceApi {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            auth_token,
        }
    }

    /// Fetch the workspace profile document.
    pub async fn get_workspace_data(&self) -> Result<WorkspaceData> {
        let response = self
            .authed(self.http.get(self.url("/wusers/get-workspace-data")))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response, "error").await);
        }
        Ok(response.json().await?)
    }

    /// Fetch the member directory.
    pub async fn get_workspace_users(&self) -> Result<Vec<WorkspaceUser>> {
        let response = self
            .authed(self.http.get(self.url("/wusers/get-workspace-users")))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response, "error").await);
        }
        Ok(response.json().await?)
    }

    /// Replace the workspace avatar URL.
    pub async fn update_avatar(&self, data: &WorkspaceData) -> Result<()> {
        let response = self
            .authed(self.http.post(self.url("/wusers/update-workspace-avatar")))
            .json(data)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response, "error").await);
        }
        Ok(())
    }

    /// Register a new workspace. Unauthenticated; this is the onboarding
    /// call that creates the tenant. Rejections use the `message` key.
    pub async fn add_workspace(&self, data: &WorkspaceData) -> Result<()> {
        let response = self
            .http
            .post(self.url("/workspace/add-workspace"))
            .json(data)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response, "message").await);
        }
        Ok(())
    }

    /// Check whether a workspace name is still free.
    pub async fn check_name(&self, data: &WorkspaceData) -> Result<()> {
        let response = self
            .http
            .post(self.url("/workspace/check-name"))
            .json(data)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response, "error").await);
        }
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Pull the server's own message out of a rejection body. Endpoints differ
/// on which key carries it.
async fn rejection(response: reqwest::Response, key: &str) -> ApiError {
    let status = response.status();
    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body.get(key)?.as_str().map(str::to_string));
    match message {
        Some(message) => ApiError::Rejected(message),
        None => ApiError::Rejected(format!(
            "Request failed with status code {}",
            status.as_u16()
        )),
    }
}
