// Client glue: configuration, the workspace HTTP API, attachment uploads,
// and the wiring that brings the event stream and sync engine up together.

pub mod config;
pub mod uploads;
pub mod workspace;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use banter_net::{Session, WsConnector};
use banter_shared::UserId;
use banter_sync::{
    spawn_session, SessionConfig, SyncCommand, SyncError, SyncNotification, UiSnapshot,
};

use crate::config::ClientConfig;
use crate::uploads::HttpUploader;
use crate::workspace::WorkspaceApi;

/// Install the global tracing subscriber. `RUST_LOG` wins when set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("banter_client=debug,banter_net=debug,banter_sync=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// A running workspace client: sync engine handles plus the HTTP API.
pub struct Client {
    /// Commands into the sync engine.
    pub commands: mpsc::Sender<SyncCommand>,
    /// Notifications out of the sync engine.
    pub notifications: mpsc::Receiver<SyncNotification>,
    /// The workspace HTTP API, sharing the client's auth.
    pub api: WorkspaceApi,
}

impl Client {
    /// Dial the event stream and start the sync engine for `user_id`.
    ///
    /// The first dial happens here, so a bad address or refused connection
    /// fails this call instead of sending the engine into its redial loop.
    pub async fn connect(config: ClientConfig, user_id: UserId) -> Result<Self, SyncError> {
        let connector = WsConnector::new(config.ws_url.clone(), config.auth_token.clone());
        let mut session = Session::new(Box::new(connector));
        session.connect().await?;

        let uploader = Arc::new(HttpUploader::new(
            &config.server_url,
            config.auth_token.clone(),
        ));
        let (commands, notifications) = spawn_session(
            session,
            user_id,
            uploader,
            SessionConfig {
                reconnect_initial: config.reconnect_initial,
                reconnect_max: config.reconnect_max,
            },
        );

        let api = WorkspaceApi::new(config.server_url.clone(), config.auth_token);
        info!(server = %config.server_url, "Workspace client started");

        Ok(Self {
            commands,
            notifications,
            api,
        })
    }

    /// Current engine state for rendering, queried over a oneshot channel.
    /// Fails with [`SyncError::EngineClosed`] once the engine has shut down.
    pub async fn snapshot(&self) -> Result<UiSnapshot, SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SyncCommand::Snapshot(reply_tx))
            .await
            .map_err(|_| SyncError::EngineClosed)?;
        reply_rx.await.map_err(|_| SyncError::EngineClosed)
    }
}
