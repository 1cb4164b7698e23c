//! The transport session: one logical link to the server, fanning the event
//! stream out to subscribers.
//!
//! A session owns a [`Connector`] and at most one live link. The link's pump
//! task runs the JSON codec in both directions and dispatches events by
//! kind. Subscribers register under an owner tag; registering the same owner
//! again replaces the old registration wholesale, which is what keeps a
//! reconnecting consumer from ever being delivered the same event twice.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use banter_shared::{ClientCommand, EventKind, ServerEvent};

use crate::channel::{Connector, EventChannel};
use crate::error::NetError;

// ---------------------------------------------------------------------------
// Subscriber plumbing
// ---------------------------------------------------------------------------

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A server event matching one of the subscribed kinds.
    Event(ServerEvent),
    /// The link dropped without an explicit `disconnect`.
    ConnectionLost,
}

struct OwnerEntry {
    kinds: HashSet<EventKind>,
    sender: mpsc::UnboundedSender<SessionEvent>,
}

type SubscriberTable = HashMap<&'static str, OwnerEntry>;

struct Link {
    outbound: mpsc::UnboundedSender<ClientCommand>,
    teardown: Arc<AtomicBool>,
    /// Set by the pump before it announces `ConnectionLost`, so a consumer
    /// reacting to that event sees the link as dead even while the pump task
    /// is still unwinding.
    lost: Arc<AtomicBool>,
    pump: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    connector: Box<dyn Connector>,
    subscribers: Arc<Mutex<SubscriberTable>>,
    link: Option<Link>,
}

impl Session {
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            link: None,
        }
    }

    /// Register `owner` for the given event kinds and return the stream of
    /// matching events. Works before or after `connect`; registrations
    /// survive a lost link.
    pub async fn subscribe(
        &self,
        owner: &'static str,
        kinds: &[EventKind],
    ) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let entry = OwnerEntry {
            kinds: kinds.iter().copied().collect(),
            sender: tx,
        };
        if self.subscribers.lock().await.insert(owner, entry).is_some() {
            debug!(owner, "Subscription replaced");
        }
        rx
    }

    /// Drop every registration held by `owner`. The owner's receiver closes.
    pub async fn unsubscribe(&self, owner: &'static str) {
        self.subscribers.lock().await.remove(owner);
    }

    /// Open the link. A no-op while a live link exists; a link that died is
    /// replaced. Subscriptions are untouched either way.
    pub async fn connect(&mut self) -> Result<(), NetError> {
        if let Some(link) = &self.link {
            if !link.pump.is_finished() && !link.lost.load(Ordering::SeqCst) {
                debug!("Connect requested while already linked");
                return Ok(());
            }
        }
        self.link = None;

        let channel = self.connector.connect().await?;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let teardown = Arc::new(AtomicBool::new(false));
        let lost = Arc::new(AtomicBool::new(false));
        let pump = tokio::spawn(pump(
            channel,
            outbound_rx,
            self.subscribers.clone(),
            teardown.clone(),
            lost.clone(),
        ));
        self.link = Some(Link {
            outbound,
            teardown,
            lost,
            pump,
        });
        info!("Session link established");
        Ok(())
    }

    /// Queue a command for the server.
    pub fn send(&self, command: ClientCommand) -> Result<(), NetError> {
        match &self.link {
            Some(link) if link.lost.load(Ordering::SeqCst) => Err(NetError::ChannelClosed),
            Some(link) => link
                .outbound
                .send(command)
                .map_err(|_| NetError::ChannelClosed),
            None => Err(NetError::NotConnected),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|l| !l.pump.is_finished() && !l.lost.load(Ordering::SeqCst))
    }

    /// Tear the session down. After this returns no further event is
    /// delivered and every subscription is gone; subscribers observe their
    /// receiver closing, never a `ConnectionLost`. Safe to call while
    /// disconnected.
    pub async fn disconnect(&mut self) {
        self.subscribers.lock().await.clear();
        if let Some(link) = self.link.take() {
            link.teardown.store(true, Ordering::SeqCst);
            drop(link.outbound);
            if let Err(e) = link.pump.await {
                warn!(error = %e, "Pump task aborted");
            }
            info!("Session disconnected");
        }
    }
}

// ---------------------------------------------------------------------------
// Link pump
// ---------------------------------------------------------------------------

async fn pump(
    mut channel: Box<dyn EventChannel>,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientCommand>,
    subscribers: Arc<Mutex<SubscriberTable>>,
    teardown: Arc<AtomicBool>,
    link_lost: Arc<AtomicBool>,
) {
    let lost = loop {
        tokio::select! {
            command = outbound_rx.recv() => match command {
                Some(command) => {
                    let frame = match serde_json::to_string(&command) {
                        Ok(frame) => frame,
                        Err(e) => {
                            error!(error = %e, "Dropping unencodable command");
                            continue;
                        }
                    };
                    if channel.send(frame).await.is_err() {
                        break true;
                    }
                }
                // Session dropped the outbound sender: explicit teardown.
                None => break false,
            },
            frame = channel.recv() => match frame {
                Some(frame) => match serde_json::from_str::<ServerEvent>(&frame) {
                    Ok(event) => dispatch(&subscribers, event).await,
                    // The server is authoritative; a frame we cannot read
                    // is skipped, not fatal.
                    Err(e) => warn!(error = %e, "Skipping undecodable frame"),
                },
                None => break true,
            },
        }
    };

    channel.close().await;

    if lost && !teardown.load(Ordering::SeqCst) {
        warn!("Connection lost");
        // Flag before announcing: whoever hears ConnectionLost may redial
        // immediately, and `connect` must not mistake this pump for live.
        link_lost.store(true, Ordering::SeqCst);
        let table = subscribers.lock().await;
        for entry in table.values() {
            let _ = entry.sender.send(SessionEvent::ConnectionLost);
        }
    }
}

async fn dispatch(subscribers: &Mutex<SubscriberTable>, event: ServerEvent) {
    let kind = event.kind();
    let table = subscribers.lock().await;
    for entry in table.values() {
        if entry.kinds.contains(&kind) {
            let _ = entry.sender.send(SessionEvent::Event(event.clone()));
        }
    }
}
