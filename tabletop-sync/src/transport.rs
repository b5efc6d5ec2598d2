//! Named-event transport seam.
//!
//! The sync controller only needs two things from the network: send an
//! event, and receive events of a given name in arrival order. Anything
//! that can do that (a WebSocket, an in-process pair, a no-op) is a
//! `Transport`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::protocol::{BoardEvent, ProtocolError};

/// Buffered events per subscriber before dispatch waits for the consumer.
pub const SUBSCRIBER_CAPACITY: usize = 256;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an event. Delivery is fire-and-forget; an `Ok` only means the
    /// event was handed to the transport.
    async fn emit(&self, event: BoardEvent) -> Result<(), ProtocolError>;

    /// Subscribe to every future event named `event_name`.
    async fn on(&self, event_name: &'static str) -> mpsc::Receiver<BoardEvent>;
}

/// Per-name subscriber lists shared by the transports in this crate.
#[derive(Default)]
pub struct Subscribers {
    channels: Mutex<HashMap<&'static str, Vec<mpsc::Sender<BoardEvent>>>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, event_name: &'static str) -> mpsc::Receiver<BoardEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.channels
            .lock()
            .await
            .entry(event_name)
            .or_default()
            .push(tx);
        rx
    }

    /// Hand `event` to every live subscriber of its name. Returns the
    /// number of subscribers reached; closed subscribers are pruned.
    ///
    /// A full subscriber is awaited rather than skipped, so a slow consumer
    /// slows the sender down instead of losing events.
    pub async fn dispatch(&self, event: BoardEvent) -> usize {
        let senders = {
            let mut channels = self.channels.lock().await;
            let Some(senders) = channels.get_mut(event.name()) else {
                log::trace!("No subscribers for {}", event.name());
                return 0;
            };
            senders.retain(|tx| !tx.is_closed());
            senders.clone()
        };

        let mut delivered = 0;
        for tx in &senders {
            if tx.send(event.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub async fn subscriber_count(&self, event_name: &str) -> usize {
        self.channels
            .lock()
            .await
            .get(event_name)
            .map_or(0, |senders| senders.iter().filter(|tx| !tx.is_closed()).count())
    }
}

/// In-process transport. A connected pair delivers each side's events to
/// the other side; a detached transport drops everything it is given.
pub struct LocalTransport {
    inbound: Arc<Subscribers>,
    peer: Option<Arc<Subscribers>>,
}

impl LocalTransport {
    pub fn pair() -> (Self, Self) {
        let left = Arc::new(Subscribers::new());
        let right = Arc::new(Subscribers::new());
        (
            Self {
                inbound: left.clone(),
                peer: Some(right.clone()),
            },
            Self {
                inbound: right,
                peer: Some(left),
            },
        )
    }

    /// A transport with nobody on the other end, for boards edited offline.
    pub fn detached() -> Self {
        Self {
            inbound: Arc::new(Subscribers::new()),
            peer: None,
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn emit(&self, event: BoardEvent) -> Result<(), ProtocolError> {
        match &self.peer {
            Some(peer) => {
                peer.dispatch(event).await;
            }
            None => log::trace!("Detached transport dropping {}", event.name()),
        }
        Ok(())
    }

    async fn on(&self, event_name: &'static str) -> mpsc::Receiver<BoardEvent> {
        self.inbound.subscribe(event_name).await
    }
}
