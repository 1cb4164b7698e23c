//! Client configuration loaded from environment variables.
//!
//! All settings have defaults pointing at a local development server, so
//! the client starts with zero configuration.

use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the workspace HTTP API.
    /// Env: `BANTER_SERVER_URL`
    /// Default: `http://localhost:8080`
    pub server_url: String,

    /// URL of the WebSocket event stream.
    /// Env: `BANTER_WS_URL`
    /// Default: derived from the server URL (`http` becomes `ws`,
    /// `https` becomes `wss`).
    pub ws_url: String,

    /// Bearer token attached to API calls and the event stream handshake.
    /// Env: `BANTER_AUTH_TOKEN`
    /// Default: none.
    pub auth_token: Option<String>,

    /// Delay before the second redial attempt; doubles per attempt.
    /// Env: `BANTER_RECONNECT_INITIAL_MS`
    /// Default: `500`
    pub reconnect_initial: Duration,

    /// Redial backoff cap.
    /// Env: `BANTER_RECONNECT_MAX_MS`
    /// Default: `30000`
    pub reconnect_max: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            ws_url: "ws://localhost:8080".to_string(),
            auth_token: None,
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults. `BANTER_WS_URL` wins over the derived stream URL.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("BANTER_SERVER_URL") {
            config.server_url = url.trim_end_matches('/').to_string();
            config.ws_url = derive_ws_url(&config.server_url);
        }

        if let Ok(url) = std::env::var("BANTER_WS_URL") {
            config.ws_url = url;
        }

        if let Ok(token) = std::env::var("BANTER_AUTH_TOKEN") {
            if !token.is_empty() {
                config.auth_token = Some(token);
            }
        }

        if let Ok(val) = std::env::var("BANTER_RECONNECT_INITIAL_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.reconnect_initial = Duration::from_millis(ms);
            } else {
                tracing::warn!(
                    value = %val,
                    "Invalid BANTER_RECONNECT_INITIAL_MS, using default"
                );
            }
        }

        if let Ok(val) = std::env::var("BANTER_RECONNECT_MAX_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.reconnect_max = Duration::from_millis(ms);
            } else {
                tracing::warn!(
                    value = %val,
                    "Invalid BANTER_RECONNECT_MAX_MS, using default"
                );
            }
        }

        config
    }
}

/// Swap the scheme of an HTTP URL for the matching WebSocket one. URLs that
/// are not HTTP pass through untouched.
fn derive_ws_url(server_url: &str) -> String {
    if let Some(rest) = server_url.strip_prefix("https://") {
        return format!("wss://{rest}");
    }
    if let Some(rest) = server_url.strip_prefix("http://") {
        return format!("ws://{rest}");
    }
    server_url.to_string()
}
