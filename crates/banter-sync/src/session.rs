//! The sync engine: one task owning all client-side workspace state.
//!
//! The engine sits between the transport session and the UI collaborator.
//! Commands come in over an mpsc channel, notifications go back out over
//! another, and the registry and timelines live exclusively inside the loop
//! task, so state mutations happen in arrival order and nothing here needs
//! a lock. Attachment uploads are the one piece of work pushed off the
//! loop; their outcomes re-enter through an internal channel.

use std::sync::Arc;

use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, warn};

use banter_net::{NetError, Session, SessionEvent};
use banter_shared::models::{Attachment, Channel, ChannelGroup, CurrentChannel, Message};
use banter_shared::{ChannelId, ClientCommand, CorrelationId, EventKind, ServerEvent, UserId};

use crate::access;
use crate::error::SyncError;
use crate::registry::{ChannelRegistry, RegistryChange};
use crate::timeline::{TimelineEntry, Timelines};
use crate::uploads::{process_uploads, AttachmentUploader, UploadError};

// ---------------------------------------------------------------------------
// Commands and notifications
// ---------------------------------------------------------------------------

/// Commands accepted by the sync engine.
#[derive(Debug)]
pub enum SyncCommand {
    /// Send a message, uploading any local attachments first.
    SendMessage {
        channel_id: ChannelId,
        body: String,
        attachments: Vec<Attachment>,
    },
    /// Re-dispatch a message whose previous send failed.
    RetryMessage {
        channel_id: ChannelId,
        correlation: CorrelationId,
    },
    /// Switch the current channel.
    SetCurrentChannel(ChannelId),
    /// Jump to the private Notes channel.
    OpenNotes,
    /// Jump to the first channel in display order.
    OpenHome,
    /// Ask the server to rename a channel. Local state changes on the echo.
    RenameChannel { channel_id: ChannelId, name: String },
    /// Ask the server to delete a channel. Local state changes on the echo.
    DeleteChannel(ChannelId),
    /// Copy out the state a renderer needs.
    Snapshot(oneshot::Sender<UiSnapshot>),
    /// Tear the session down, then acknowledge.
    Shutdown(oneshot::Sender<()>),
}

/// Notifications pushed to the UI collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotification {
    /// The event stream is up, on first connect and on every reconnect.
    Connected,
    /// The event stream dropped; the engine is redialing.
    ConnectionLost,
    /// Channel groups or memberships changed.
    RegistryUpdated,
    /// A channel's timeline changed.
    TimelineUpdated { channel_id: ChannelId },
    /// The current channel moved, or its display name changed.
    CurrentChannelChanged { current: CurrentChannel },
    /// The read-only verdict for the current channel flipped.
    AccessChanged { readonly: bool },
    /// A send did not go through. When a timeline entry was staged, its
    /// correlation id is carried so the UI can offer a retry.
    SendFailed {
        channel_id: ChannelId,
        correlation: Option<CorrelationId>,
        reason: String,
    },
    /// An attachment batch failed; the message was never staged.
    UploadFailed { reason: String },
}

/// State copied out for rendering: the channel tree, the current channel
/// with its timeline, and the access verdict.
#[derive(Debug, Clone)]
pub struct UiSnapshot {
    pub groups: Vec<ChannelGroup>,
    pub notes: Channel,
    pub current: CurrentChannel,
    pub timeline: Vec<TimelineEntry>,
    pub readonly: bool,
}

/// Reconnect tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Delay before the second redial attempt; doubles per attempt.
    pub reconnect_initial: Duration,
    /// Backoff cap.
    pub reconnect_max: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

/// Spawn the sync engine over an already-built transport session.
///
/// Returns the command handle and the notification stream. The engine
/// requests a channel snapshot as soon as the link is up; if the session
/// arrives unconnected it starts in the redial path instead.
pub fn spawn_session(
    session: Session,
    user_id: UserId,
    uploader: Arc<dyn AttachmentUploader>,
    config: SessionConfig,
) -> (mpsc::Sender<SyncCommand>, mpsc::Receiver<SyncNotification>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let (notif_tx, notif_rx) = mpsc::channel(256);
    let engine = Engine {
        session,
        registry: ChannelRegistry::new(user_id),
        timelines: Timelines::default(),
        uploader,
        config,
        notif_tx,
    };
    tokio::spawn(engine.run(cmd_rx));
    (cmd_tx, notif_rx)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Outcome of an off-loop upload batch, carrying the send it belongs to.
struct UploadOutcome {
    channel_id: ChannelId,
    body: String,
    result: Result<Vec<Attachment>, UploadError>,
}

enum Flow {
    Continue,
    Exit,
}

struct Engine {
    session: Session,
    registry: ChannelRegistry,
    timelines: Timelines,
    uploader: Arc<dyn AttachmentUploader>,
    config: SessionConfig,
    notif_tx: mpsc::Sender<SyncNotification>,
}

impl Engine {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<SyncCommand>) {
        let mut events = self.session.subscribe("sync", &EventKind::ALL).await;
        let (upload_tx, mut upload_rx) = mpsc::channel::<UploadOutcome>(64);

        if self.session.is_connected() {
            if let Err(e) = self.session.send(ClientCommand::FetchChannelGroups) {
                warn!(error = %e, "Initial channel snapshot request failed");
            }
            self.notify(SyncNotification::Connected).await;
        } else if let Flow::Exit = self.redial(&mut cmd_rx, &upload_tx).await {
            return;
        }

        loop {
            tokio::select! {
                command = cmd_rx.recv() => match command {
                    Some(command) => {
                        if let Flow::Exit = self.handle_command(command, &upload_tx).await {
                            break;
                        }
                    }
                    None => {
                        // Every command handle is gone; tear down silently.
                        info!("Command channel closed, stopping sync engine");
                        self.teardown().await;
                        break;
                    }
                },
                event = events.recv() => match event {
                    Some(SessionEvent::Event(event)) => self.apply_event(event).await,
                    Some(SessionEvent::ConnectionLost) => {
                        if let Flow::Exit = self.on_connection_lost(&mut cmd_rx, &upload_tx).await {
                            break;
                        }
                    }
                    None => {
                        warn!("Event subscription closed underneath the engine");
                        self.teardown().await;
                        break;
                    }
                },
                outcome = upload_rx.recv() => {
                    if let Some(outcome) = outcome {
                        self.finish_upload(outcome).await;
                    }
                }
            }
        }
        info!("Sync engine stopped");
    }

    async fn notify(&self, notification: SyncNotification) {
        let _ = self.notif_tx.send(notification).await;
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    async fn handle_command(
        &mut self,
        command: SyncCommand,
        upload_tx: &mpsc::Sender<UploadOutcome>,
    ) -> Flow {
        match command {
            SyncCommand::SendMessage {
                channel_id,
                body,
                attachments,
            } => {
                self.start_send(channel_id, body, attachments, upload_tx)
                    .await;
            }
            SyncCommand::RetryMessage {
                channel_id,
                correlation,
            } => match self.timelines.retry(&channel_id, &correlation) {
                Some(message) => {
                    self.notify(SyncNotification::TimelineUpdated {
                        channel_id: channel_id.clone(),
                    })
                    .await;
                    self.dispatch(channel_id, correlation, message).await;
                }
                None => {
                    debug!(correlation = %correlation, "Retry without a failed entry ignored")
                }
            },
            SyncCommand::SetCurrentChannel(channel_id) => self.change_current(channel_id).await,
            SyncCommand::OpenNotes => {
                let id = self.registry.notes().id.clone();
                self.change_current(id).await;
            }
            SyncCommand::OpenHome => {
                let id = self.registry.home_channel().id.clone();
                self.change_current(id).await;
            }
            SyncCommand::RenameChannel { channel_id, name } => {
                if let Err(e) = self
                    .session
                    .send(ClientCommand::RenameChannel { channel_id, name })
                {
                    warn!(error = %e, "Rename request not sent");
                }
            }
            SyncCommand::DeleteChannel(channel_id) => {
                if let Err(e) = self.session.send(ClientCommand::DeleteChannel { channel_id }) {
                    warn!(error = %e, "Delete request not sent");
                }
            }
            SyncCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            SyncCommand::Shutdown(reply) => {
                info!("Sync shutdown requested");
                self.teardown().await;
                let _ = reply.send(());
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    /// Gate a send, then stage it directly or hand the attachment batch to
    /// an off-loop upload task.
    async fn start_send(
        &mut self,
        channel_id: ChannelId,
        body: String,
        attachments: Vec<Attachment>,
        upload_tx: &mpsc::Sender<UploadOutcome>,
    ) {
        match self.registry.find(&channel_id) {
            Some(channel) => {
                if access::is_readonly(channel, self.registry.user_id()) {
                    self.notify(SyncNotification::SendFailed {
                        channel_id,
                        correlation: None,
                        reason: "Channel is read-only".into(),
                    })
                    .await;
                    return;
                }
            }
            None => {
                let reason = SyncError::UnknownChannel(channel_id.clone()).to_string();
                self.notify(SyncNotification::SendFailed {
                    channel_id,
                    correlation: None,
                    reason,
                })
                .await;
                return;
            }
        }

        if attachments.iter().all(Attachment::is_resolved) {
            self.finish_send(channel_id, body, attachments).await;
            return;
        }

        // Uploads run off the loop so a slow file service cannot stall
        // event processing; the outcome re-enters through `upload_tx`.
        let uploader = self.uploader.clone();
        let outcome_tx = upload_tx.clone();
        tokio::spawn(async move {
            let result = process_uploads(uploader.as_ref(), attachments).await;
            let _ = outcome_tx
                .send(UploadOutcome {
                    channel_id,
                    body,
                    result,
                })
                .await;
        });
    }

    async fn finish_upload(&mut self, outcome: UploadOutcome) {
        match outcome.result {
            Ok(attachments) => {
                self.finish_send(outcome.channel_id, outcome.body, attachments)
                    .await
            }
            Err(e) => {
                warn!(error = %e, "Attachment batch failed");
                self.notify(SyncNotification::UploadFailed {
                    reason: SyncError::from(e).to_string(),
                })
                .await;
            }
        }
    }

    /// Stage the optimistic entry and put the send on the wire. The channel
    /// is re-checked because it may have vanished while uploads ran.
    async fn finish_send(&mut self, channel_id: ChannelId, body: String, attachments: Vec<Attachment>) {
        if self.registry.find(&channel_id).is_none() {
            let reason = SyncError::UnknownChannel(channel_id.clone()).to_string();
            self.notify(SyncNotification::SendFailed {
                channel_id,
                correlation: None,
                reason,
            })
            .await;
            return;
        }

        let author = self.registry.user_id().clone();
        match self
            .timelines
            .stage_send(&channel_id, author, body, attachments)
        {
            Ok((correlation, message)) => {
                self.notify(SyncNotification::TimelineUpdated {
                    channel_id: channel_id.clone(),
                })
                .await;
                self.dispatch(channel_id, correlation, message).await;
            }
            Err(e) => {
                self.notify(SyncNotification::SendFailed {
                    channel_id,
                    correlation: None,
                    reason: e.to_string(),
                })
                .await;
            }
        }
    }

    /// Hand a staged message to the transport. A refusal flips the entry to
    /// Failed on the spot instead of waiting for a lost-link sweep.
    async fn dispatch(&mut self, channel_id: ChannelId, correlation: CorrelationId, message: Message) {
        let command = ClientCommand::SendMessage {
            channel_id: channel_id.clone(),
            correlation: correlation.clone(),
            body: message.body,
            attachments: message.attachments,
        };
        if let Err(e) = self.session.send(command) {
            self.timelines.mark_failed(&channel_id, &correlation);
            self.notify(SyncNotification::TimelineUpdated {
                channel_id: channel_id.clone(),
            })
            .await;
            self.notify(SyncNotification::SendFailed {
                channel_id,
                correlation: Some(correlation),
                reason: e.to_string(),
            })
            .await;
        }
    }

    /// Move the current channel, reporting position and access deltas.
    /// Navigation never touches registry data, so no `RegistryUpdated`.
    async fn change_current(&mut self, target: ChannelId) {
        let current_before = self.registry.current().clone();
        let readonly_before = self.registry.is_current_readonly();

        self.registry.set_current(&target);

        let current = self.registry.current().clone();
        if current != current_before {
            self.notify(SyncNotification::CurrentChannelChanged { current })
                .await;
        }
        let readonly = self.registry.is_current_readonly();
        if readonly != readonly_before {
            self.notify(SyncNotification::AccessChanged { readonly }).await;
        }
    }

    fn snapshot(&self) -> UiSnapshot {
        let current = self.registry.current().clone();
        UiSnapshot {
            groups: self.registry.groups().to_vec(),
            notes: self.registry.notes().clone(),
            timeline: self.timelines.channel(&current.id).to_vec(),
            readonly: self.registry.is_current_readonly(),
            current,
        }
    }

    // -----------------------------------------------------------------------
    // Server events
    // -----------------------------------------------------------------------

    async fn apply_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::ChannelGroups { groups } => {
                self.mutate_registry(|registry| registry.apply_snapshot(groups))
                    .await;
            }
            ServerEvent::MessageSent {
                message,
                correlation,
            } => {
                let channel_id = message.channel_id.clone();
                if self.timelines.on_server_echo(message, correlation) {
                    self.notify(SyncNotification::TimelineUpdated { channel_id })
                        .await;
                }
            }
            ServerEvent::MessageEdited {
                message_id,
                channel_id,
                body,
                edited_at,
            } => {
                if self
                    .timelines
                    .on_edited(&channel_id, &message_id, body, edited_at)
                {
                    self.notify(SyncNotification::TimelineUpdated { channel_id })
                        .await;
                }
            }
            ServerEvent::MessageDeleted {
                message_id,
                channel_id,
            } => {
                if self.timelines.on_deleted(&channel_id, &message_id) {
                    self.notify(SyncNotification::TimelineUpdated { channel_id })
                        .await;
                }
            }
            ServerEvent::UserJoinedChannel {
                channel_id,
                user_id,
            } => {
                self.mutate_registry(|registry| registry.apply_joined(&channel_id, user_id))
                    .await;
            }
            ServerEvent::UserLeftChannel {
                channel_id,
                user_id,
            } => {
                self.mutate_registry(|registry| registry.apply_left(&channel_id, &user_id))
                    .await;
            }
            ServerEvent::ChannelRenamed { channel_id, name } => {
                self.mutate_registry(|registry| registry.apply_renamed(&channel_id, &name))
                    .await;
            }
            ServerEvent::ChannelDeleted { channel_id } => {
                self.mutate_registry(|registry| registry.apply_deleted(&channel_id))
                    .await;
            }
        }
    }

    /// Run a registry mutation, then emit what its effects call for:
    /// `RegistryUpdated` unless the event was stale, plus any current-channel
    /// or access delta observed across the mutation.
    async fn mutate_registry<F>(&mut self, mutate: F)
    where
        F: FnOnce(&mut ChannelRegistry) -> RegistryChange,
    {
        let current_before = self.registry.current().clone();
        let readonly_before = self.registry.is_current_readonly();

        if mutate(&mut self.registry) == RegistryChange::Ignored {
            return;
        }
        self.notify(SyncNotification::RegistryUpdated).await;

        let current = self.registry.current().clone();
        if current != current_before {
            self.notify(SyncNotification::CurrentChannelChanged { current })
                .await;
        }
        let readonly = self.registry.is_current_readonly();
        if readonly != readonly_before {
            self.notify(SyncNotification::AccessChanged { readonly }).await;
        }
    }

    // -----------------------------------------------------------------------
    // Link lifecycle
    // -----------------------------------------------------------------------

    async fn on_connection_lost(
        &mut self,
        cmd_rx: &mut mpsc::Receiver<SyncCommand>,
        upload_tx: &mpsc::Sender<UploadOutcome>,
    ) -> Flow {
        warn!("Event stream lost");
        self.notify(SyncNotification::ConnectionLost).await;

        // Anything unacknowledged is presumed lost. The entries stay in
        // place as Failed so the user can retry once the link is back.
        for (channel_id, correlation) in self.timelines.fail_all_pending() {
            self.notify(SyncNotification::TimelineUpdated {
                channel_id: channel_id.clone(),
            })
            .await;
            self.notify(SyncNotification::SendFailed {
                channel_id,
                correlation: Some(correlation),
                reason: NetError::NotConnected.to_string(),
            })
            .await;
        }

        self.redial(cmd_rx, upload_tx).await
    }

    /// Redial with exponential backoff and jitter until the link is back.
    /// Commands keep being served between attempts, so snapshots render,
    /// sends fail visibly instead of hanging, and shutdown stays prompt.
    async fn redial(
        &mut self,
        cmd_rx: &mut mpsc::Receiver<SyncCommand>,
        upload_tx: &mpsc::Sender<UploadOutcome>,
    ) -> Flow {
        let mut delay = self.config.reconnect_initial;
        loop {
            match self.session.connect().await {
                Ok(()) => {
                    info!("Event stream connected");
                    if let Err(e) = self.session.send(ClientCommand::FetchChannelGroups) {
                        warn!(error = %e, "Channel snapshot request failed after reconnect");
                    }
                    self.notify(SyncNotification::Connected).await;
                    return Flow::Continue;
                }
                Err(e) => {
                    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=250));
                    let wait = delay + jitter;
                    warn!(error = %e, wait_ms = wait.as_millis() as u64, "Dial failed, backing off");
                    let deadline = Instant::now() + wait;
                    loop {
                        tokio::select! {
                            _ = sleep_until(deadline) => break,
                            command = cmd_rx.recv() => match command {
                                Some(command) => {
                                    if let Flow::Exit = self.handle_command(command, upload_tx).await {
                                        return Flow::Exit;
                                    }
                                }
                                None => {
                                    self.teardown().await;
                                    return Flow::Exit;
                                }
                            },
                        }
                    }
                    delay = (delay * 2).min(self.config.reconnect_max);
                }
            }
        }
    }

    /// Ordered teardown: close the link and drop the subscriber table via
    /// `disconnect`, then release user-derived state.
    async fn teardown(&mut self) {
        self.session.disconnect().await;
        let user_id = self.registry.user_id().clone();
        self.registry = ChannelRegistry::new(user_id);
        self.timelines = Timelines::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::time::timeout;
    use uuid::Uuid;

    use banter_net::memory::{self, MemoryListener, ServerEnd};
    use banter_shared::models::ChannelKind;
    use banter_shared::{GroupId, MessageId};

    use crate::timeline::Delivery;

    #[derive(Default)]
    struct StubUploader {
        fail_with: Option<&'static str>,
    }

    #[async_trait]
    impl AttachmentUploader for StubUploader {
        async fn upload(&self, attachment: &Attachment) -> Result<String, UploadError> {
            match self.fail_with {
                Some(reason) => Err(UploadError {
                    file_name: attachment.file_name.clone(),
                    reason: reason.into(),
                }),
                None => Ok(format!("https://files.test/{}", attachment.file_name)),
            }
        }
    }

    fn user() -> UserId {
        UserId(Uuid::new_v4())
    }

    fn channel(owner: &UserId, name: &str, readonly: bool) -> Channel {
        Channel {
            id: ChannelId::new(),
            name: name.into(),
            owner_id: owner.clone(),
            readonly,
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

    fn server_message(channel_id: &ChannelId, body: &str) -> Message {
        Message {
            id: MessageId::new(),
            channel_id: channel_id.clone(),
            author_id: user(),
            body: body.into(),
            attachments: Vec::new(),
            created_at: Utc::now(),
            edited_at: None,
            deleted_at: None,
        }
    }

    async fn start_engine(
        user_id: UserId,
        uploader: StubUploader,
    ) -> (
        mpsc::Sender<SyncCommand>,
        mpsc::Receiver<SyncNotification>,
        MemoryListener,
        ServerEnd,
    ) {
        let (connector, mut listener) = memory::pair();
        let mut session = Session::new(Box::new(connector));
        session.connect().await.unwrap();
        let config = SessionConfig {
            reconnect_initial: Duration::from_millis(10),
            reconnect_max: Duration::from_millis(40),
        };
        let (cmd_tx, notif_rx) = spawn_session(session, user_id, Arc::new(uploader), config);
        let mut server = listener.accept().await.expect("engine link accepted");
        assert_eq!(
            server.next_command().await,
            Some(ClientCommand::FetchChannelGroups)
        );
        (cmd_tx, notif_rx, listener, server)
    }

    /// Engine with one writable or read-only channel already synced.
    async fn seeded(
        readonly: bool,
        uploader: StubUploader,
    ) -> (
        mpsc::Sender<SyncCommand>,
        mpsc::Receiver<SyncNotification>,
        MemoryListener,
        ServerEnd,
        Channel,
    ) {
        let (cmd_tx, mut notif_rx, listener, server) = start_engine(user(), uploader).await;
        let owner = user();
        let general = channel(&owner, "general", readonly);
        server.push(&ServerEvent::ChannelGroups {
            groups: vec![group("Work", vec![general.clone()])],
        });
        wait_for(&mut notif_rx, |n| *n == SyncNotification::RegistryUpdated).await;
        (cmd_tx, notif_rx, listener, server, general)
    }

    async fn next_notif(rx: &mut mpsc::Receiver<SyncNotification>) -> SyncNotification {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("notification timed out")
            .expect("notification stream closed")
    }

    async fn wait_for<F>(rx: &mut mpsc::Receiver<SyncNotification>, pred: F) -> SyncNotification
    where
        F: Fn(&SyncNotification) -> bool,
    {
        loop {
            let notification = next_notif(rx).await;
            if pred(&notification) {
                return notification;
            }
        }
    }

    async fn ui_snapshot(cmd_tx: &mpsc::Sender<SyncCommand>) -> UiSnapshot {
        let (tx, rx) = oneshot::channel();
        cmd_tx.send(SyncCommand::Snapshot(tx)).await.unwrap();
        timeout(Duration::from_secs(1), rx)
            .await
            .expect("snapshot timed out")
            .expect("snapshot reply dropped")
    }

    #[tokio::test]
    async fn startup_requests_the_snapshot_and_reports_connected() {
        let (_cmd_tx, mut notif_rx, _listener, _server) =
            start_engine(user(), StubUploader::default()).await;
        assert_eq!(next_notif(&mut notif_rx).await, SyncNotification::Connected);
    }

    #[tokio::test]
    async fn registry_snapshot_flows_into_the_ui_state() {
        let (cmd_tx, _notif_rx, _listener, _server, general) =
            seeded(false, StubUploader::default()).await;

        let snap = ui_snapshot(&cmd_tx).await;
        assert_eq!(snap.groups.len(), 1);
        assert_eq!(snap.groups[0].channels[0].id, general.id);
        // Until navigation happens the engine sits on Notes.
        assert_eq!(snap.current.id, snap.notes.id);
        assert!(!snap.readonly);
    }

    #[tokio::test]
    async fn send_then_echo_collapses_to_one_confirmed_entry() {
        let (cmd_tx, mut notif_rx, _listener, mut server, general) =
            seeded(false, StubUploader::default()).await;
        cmd_tx
            .send(SyncCommand::SetCurrentChannel(general.id.clone()))
            .await
            .unwrap();
        wait_for(&mut notif_rx, |n| {
            matches!(n, SyncNotification::CurrentChannelChanged { .. })
        })
        .await;

        cmd_tx
            .send(SyncCommand::SendMessage {
                channel_id: general.id.clone(),
                body: "hey".into(),
                attachments: vec![],
            })
            .await
            .unwrap();
        wait_for(&mut notif_rx, |n| {
            matches!(n, SyncNotification::TimelineUpdated { .. })
        })
        .await;

        let correlation = match server.next_command().await.expect("send reaches the server") {
            ClientCommand::SendMessage {
                correlation, body, ..
            } => {
                assert_eq!(body, "hey");
                correlation
            }
            other => panic!("unexpected command: {other:?}"),
        };

        let echo = server_message(&general.id, "hey");
        server.push(&ServerEvent::MessageSent {
            message: echo.clone(),
            correlation: Some(correlation),
        });
        wait_for(&mut notif_rx, |n| {
            matches!(n, SyncNotification::TimelineUpdated { .. })
        })
        .await;

        let snap = ui_snapshot(&cmd_tx).await;
        assert_eq!(snap.timeline.len(), 1);
        assert_eq!(snap.timeline[0].message.id, echo.id);
        assert_eq!(snap.timeline[0].delivery, Delivery::Confirmed);
    }

    #[tokio::test]
    async fn sending_to_a_readonly_channel_is_refused() {
        let (cmd_tx, mut notif_rx, _listener, mut server, locked) =
            seeded(true, StubUploader::default()).await;
        cmd_tx
            .send(SyncCommand::SetCurrentChannel(locked.id.clone()))
            .await
            .unwrap();
        wait_for(&mut notif_rx, |n| {
            matches!(n, SyncNotification::CurrentChannelChanged { .. })
        })
        .await;

        cmd_tx
            .send(SyncCommand::SendMessage {
                channel_id: locked.id.clone(),
                body: "nope".into(),
                attachments: vec![],
            })
            .await
            .unwrap();

        match wait_for(&mut notif_rx, |n| {
            matches!(n, SyncNotification::SendFailed { .. })
        })
        .await
        {
            SyncNotification::SendFailed {
                correlation,
                reason,
                ..
            } => {
                assert_eq!(correlation, None);
                assert_eq!(reason, "Channel is read-only");
            }
            _ => unreachable!(),
        }

        // Nothing was staged and nothing crossed the wire.
        let snap = ui_snapshot(&cmd_tx).await;
        assert!(snap.timeline.is_empty());
        assert!(timeout(Duration::from_millis(50), server.next_command())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn upload_failure_reports_and_leaves_the_timeline_alone() {
        let (cmd_tx, mut notif_rx, _listener, mut server, general) = seeded(
            false,
            StubUploader {
                fail_with: Some("file service offline"),
            },
        )
        .await;
        cmd_tx
            .send(SyncCommand::SetCurrentChannel(general.id.clone()))
            .await
            .unwrap();
        wait_for(&mut notif_rx, |n| {
            matches!(n, SyncNotification::CurrentChannelChanged { .. })
        })
        .await;

        cmd_tx
            .send(SyncCommand::SendMessage {
                channel_id: general.id.clone(),
                body: "with file".into(),
                attachments: vec![Attachment::local("/tmp/a.png", "image/png", 3)],
            })
            .await
            .unwrap();

        match wait_for(&mut notif_rx, |n| {
            matches!(n, SyncNotification::UploadFailed { .. })
        })
        .await
        {
            SyncNotification::UploadFailed { reason } => {
                assert!(reason.contains("file service offline"), "got: {reason}")
            }
            _ => unreachable!(),
        }

        let snap = ui_snapshot(&cmd_tx).await;
        assert!(snap.timeline.is_empty());
        assert!(timeout(Duration::from_millis(50), server.next_command())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn local_attachments_are_resolved_before_the_wire() {
        let (cmd_tx, mut notif_rx, _listener, mut server, general) =
            seeded(false, StubUploader::default()).await;

        cmd_tx
            .send(SyncCommand::SendMessage {
                channel_id: general.id.clone(),
                body: "photo".into(),
                attachments: vec![Attachment::local("/tmp/photo.png", "image/png", 9)],
            })
            .await
            .unwrap();
        wait_for(&mut notif_rx, |n| {
            matches!(n, SyncNotification::TimelineUpdated { .. })
        })
        .await;

        match server.next_command().await.expect("send reaches the server") {
            ClientCommand::SendMessage { attachments, .. } => {
                assert_eq!(attachments.len(), 1);
                assert_eq!(
                    attachments[0].remote_url(),
                    Some("https://files.test/photo.png")
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn deleting_the_current_channel_redirects_and_reports() {
        let (cmd_tx, mut notif_rx, _listener, server, general) =
            seeded(false, StubUploader::default()).await;
        cmd_tx
            .send(SyncCommand::SetCurrentChannel(general.id.clone()))
            .await
            .unwrap();
        wait_for(&mut notif_rx, |n| {
            matches!(n, SyncNotification::CurrentChannelChanged { .. })
        })
        .await;

        server.push(&ServerEvent::ChannelDeleted {
            channel_id: general.id.clone(),
        });
        match wait_for(&mut notif_rx, |n| {
            matches!(n, SyncNotification::CurrentChannelChanged { .. })
        })
        .await
        {
            SyncNotification::CurrentChannelChanged { current } => {
                assert_eq!(current.name, "Notes")
            }
            _ => unreachable!(),
        }

        let snap = ui_snapshot(&cmd_tx).await;
        assert_eq!(snap.current.id, snap.notes.id);
        assert!(snap.groups[0].channels.is_empty());
    }

    #[tokio::test]
    async fn readonly_flip_on_the_current_channel_raises_access_changed() {
        let (cmd_tx, mut notif_rx, _listener, server, general) =
            seeded(false, StubUploader::default()).await;
        cmd_tx
            .send(SyncCommand::SetCurrentChannel(general.id.clone()))
            .await
            .unwrap();
        wait_for(&mut notif_rx, |n| {
            matches!(n, SyncNotification::CurrentChannelChanged { .. })
        })
        .await;

        let mut locked = general.clone();
        locked.readonly = true;
        server.push(&ServerEvent::ChannelGroups {
            groups: vec![group("Work", vec![locked])],
        });

        assert_eq!(
            wait_for(&mut notif_rx, |n| matches!(
                n,
                SyncNotification::AccessChanged { .. }
            ))
            .await,
            SyncNotification::AccessChanged { readonly: true }
        );
        assert!(ui_snapshot(&cmd_tx).await.readonly);
    }

    #[tokio::test]
    async fn lost_link_fails_pending_sends_then_redials() {
        let (cmd_tx, mut notif_rx, mut listener, mut server, general) =
            seeded(false, StubUploader::default()).await;
        cmd_tx
            .send(SyncCommand::SetCurrentChannel(general.id.clone()))
            .await
            .unwrap();
        wait_for(&mut notif_rx, |n| {
            matches!(n, SyncNotification::CurrentChannelChanged { .. })
        })
        .await;

        cmd_tx
            .send(SyncCommand::SendMessage {
                channel_id: general.id.clone(),
                body: "in flight".into(),
                attachments: vec![],
            })
            .await
            .unwrap();
        let correlation = match server.next_command().await.expect("send dispatched") {
            ClientCommand::SendMessage { correlation, .. } => correlation,
            other => panic!("unexpected command: {other:?}"),
        };

        drop(server);
        wait_for(&mut notif_rx, |n| *n == SyncNotification::ConnectionLost).await;
        match wait_for(&mut notif_rx, |n| {
            matches!(n, SyncNotification::SendFailed { .. })
        })
        .await
        {
            SyncNotification::SendFailed {
                correlation: failed,
                ..
            } => assert_eq!(failed, Some(correlation.clone())),
            _ => unreachable!(),
        }

        // The engine redials and refreshes its channel snapshot.
        let mut server = listener.accept().await.expect("engine redials");
        assert_eq!(
            server.next_command().await,
            Some(ClientCommand::FetchChannelGroups)
        );
        wait_for(&mut notif_rx, |n| *n == SyncNotification::Connected).await;

        let snap = ui_snapshot(&cmd_tx).await;
        assert_eq!(snap.timeline.len(), 1);
        assert_eq!(
            snap.timeline[0].delivery,
            Delivery::Failed {
                correlation: correlation.clone()
            }
        );

        // A late echo still claims the failed entry instead of duplicating it.
        server.push(&ServerEvent::MessageSent {
            message: server_message(&general.id, "in flight"),
            correlation: Some(correlation),
        });
        wait_for(&mut notif_rx, |n| {
            matches!(n, SyncNotification::TimelineUpdated { .. })
        })
        .await;
        let snap = ui_snapshot(&cmd_tx).await;
        assert_eq!(snap.timeline.len(), 1);
        assert_eq!(snap.timeline[0].delivery, Delivery::Confirmed);
    }

    #[tokio::test]
    async fn retry_reuses_the_correlation_on_the_wire() {
        let (cmd_tx, mut notif_rx, mut listener, mut server, general) =
            seeded(false, StubUploader::default()).await;

        cmd_tx
            .send(SyncCommand::SendMessage {
                channel_id: general.id.clone(),
                body: "second try".into(),
                attachments: vec![],
            })
            .await
            .unwrap();
        let correlation = match server.next_command().await.expect("send dispatched") {
            ClientCommand::SendMessage { correlation, .. } => correlation,
            other => panic!("unexpected command: {other:?}"),
        };

        drop(server);
        wait_for(&mut notif_rx, |n| {
            matches!(n, SyncNotification::SendFailed { .. })
        })
        .await;
        let mut server = listener.accept().await.expect("engine redials");
        assert_eq!(
            server.next_command().await,
            Some(ClientCommand::FetchChannelGroups)
        );
        wait_for(&mut notif_rx, |n| *n == SyncNotification::Connected).await;

        cmd_tx
            .send(SyncCommand::RetryMessage {
                channel_id: general.id.clone(),
                correlation: correlation.clone(),
            })
            .await
            .unwrap();
        match server.next_command().await.expect("retry dispatched") {
            ClientCommand::SendMessage {
                correlation: wire_correlation,
                body,
                ..
            } => {
                assert_eq!(wire_correlation, correlation);
                assert_eq!(body, "second try");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_stops_the_engine_and_closes_notifications() {
        let (cmd_tx, mut notif_rx, _listener, server) =
            start_engine(user(), StubUploader::default()).await;
        wait_for(&mut notif_rx, |n| *n == SyncNotification::Connected).await;

        let (tx, rx) = oneshot::channel();
        cmd_tx.send(SyncCommand::Shutdown(tx)).await.unwrap();
        timeout(Duration::from_secs(1), rx)
            .await
            .expect("ack timed out")
            .expect("ack dropped");

        // Events pushed after teardown go nowhere and the stream ends.
        server.push(&ServerEvent::ChannelDeleted {
            channel_id: ChannelId::new(),
        });
        let end = timeout(Duration::from_secs(1), notif_rx.recv())
            .await
            .expect("stream should close");
        assert!(end.is_none());
        assert!(cmd_tx.send(SyncCommand::OpenNotes).await.is_err());
    }

    #[tokio::test]
    async fn stale_events_produce_no_notifications() {
        let (_cmd_tx, mut notif_rx, _listener, server) =
            start_engine(user(), StubUploader::default()).await;
        wait_for(&mut notif_rx, |n| *n == SyncNotification::Connected).await;

        server.push(&ServerEvent::ChannelRenamed {
            channel_id: ChannelId::new(),
            name: "ghost".into(),
        });
        server.push(&ServerEvent::MessageDeleted {
            channel_id: ChannelId::new(),
            message_id: MessageId::new(),
        });
        assert!(timeout(Duration::from_millis(50), notif_rx.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn open_home_and_open_notes_navigate() {
        let (cmd_tx, mut notif_rx, _listener, _server, general) =
            seeded(false, StubUploader::default()).await;

        cmd_tx.send(SyncCommand::OpenHome).await.unwrap();
        match wait_for(&mut notif_rx, |n| {
            matches!(n, SyncNotification::CurrentChannelChanged { .. })
        })
        .await
        {
            SyncNotification::CurrentChannelChanged { current } => {
                assert_eq!(current.id, general.id)
            }
            _ => unreachable!(),
        }

        cmd_tx.send(SyncCommand::OpenNotes).await.unwrap();
        match wait_for(&mut notif_rx, |n| {
            matches!(n, SyncNotification::CurrentChannelChanged { .. })
        })
        .await
        {
            SyncNotification::CurrentChannelChanged { current } => {
                assert_eq!(current.name, "Notes")
            }
            _ => unreachable!(),
        }
    }
}
