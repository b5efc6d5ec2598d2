//! WebSocket client transport for the board server.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect)
//! - Event send/receive as bincode `SyncMessage` frames
//! - Offline queue for events emitted while disconnected
//!
//! The queue is a transport concern only. The sync protocol itself never
//! retries a lost diff.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::protocol::{BoardEvent, ProtocolError, SyncMessage};
use crate::transport::{Subscribers, Transport};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted while disconnected, replayed on connect.
pub struct OfflineQueue {
    queue: VecDeque<QueuedEvent>,
    max_size: usize,
}

#[derive(Debug, Clone)]
struct QueuedEvent {
    clock: u64,
    event: BoardEvent,
}

impl OfflineQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Returns false when the queue is full.
    pub fn enqueue(&mut self, clock: u64, event: BoardEvent) -> bool {
        if self.queue.len() >= self.max_size {
            return false;
        }
        self.queue.push_back(QueuedEvent { clock, event });
        true
    }

    pub fn drain(&mut self) -> Vec<(u64, BoardEvent)> {
        self.queue.drain(..).map(|q| (q.clock, q.event)).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

/// Client-side configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Full URL including the namespace, e.g. `ws://127.0.0.1:9090/board`
    pub url: String,
    /// Maximum events held while disconnected
    pub offline_queue_size: usize,
    /// Outgoing frame buffer
    pub outgoing_capacity: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9090/board".to_string(),
            offline_queue_size: 10_000,
            outgoing_capacity: 256,
        }
    }
}

/// The WebSocket transport.
pub struct WsTransport {
    peer_id: Uuid,
    config: WsConfig,
    state: Arc<RwLock<ConnectionState>>,
    clock: Mutex<u64>,
    offline_queue: Mutex<OfflineQueue>,
    outgoing_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    subscribers: Arc<Subscribers>,
}

impl WsTransport {
    pub fn new(config: WsConfig) -> Self {
        let queue_size = config.offline_queue_size;
        Self {
            peer_id: Uuid::new_v4(),
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            clock: Mutex::new(0),
            offline_queue: Mutex::new(OfflineQueue::new(queue_size)),
            outgoing_tx: Mutex::new(None),
            subscribers: Arc::new(Subscribers::new()),
        }
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self::new(WsConfig {
            url: url.into(),
            ..WsConfig::default()
        })
    }

    /// Connect to the server.
    ///
    /// Spawns background tasks for reading and writing frames, then replays
    /// anything queued while offline.
    pub async fn connect(&self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let ws_stream = match tokio_tungstenite::connect_async(&self.config.url).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                log::warn!("Failed to connect to {}: {e}", self.config.url);
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::ConnectionClosed);
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward outgoing channel to WebSocket
        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(self.config.outgoing_capacity);
        tokio::spawn(async move {
            while let Some(data) = out_rx.recv().await {
                if ws_writer.send(Message::Binary(data.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        // Reader task: decode frames and hand them to subscribers
        let subscribers = self.subscribers.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            let mut last_clock: HashMap<Uuid, u64> = HashMap::new();
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Binary(data)) => match SyncMessage::decode(&data) {
                        Ok(sync_msg) => {
                            note_clock(&mut last_clock, &sync_msg);
                            log::debug!("Received {} from {}", sync_msg.name(), sync_msg.peer_id);
                            subscribers.dispatch(sync_msg.event).await;
                        }
                        Err(e) => log::warn!("Dropping undecodable frame: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            *state.write().await = ConnectionState::Disconnected;
            log::info!("Disconnected from board server");
        });

        *self.outgoing_tx.lock().await = Some(out_tx.clone());
        *self.state.write().await = ConnectionState::Connected;
        log::info!("Connected to {} as {}", self.config.url, self.peer_id);

        let queued = self.offline_queue.lock().await.drain();
        if !queued.is_empty() {
            log::info!("Replaying {} queued events", queued.len());
            for (clock, event) in queued {
                let encoded = SyncMessage::new(self.peer_id, clock, event).encode()?;
                out_tx
                    .send(encoded)
                    .await
                    .map_err(|_| ProtocolError::ConnectionClosed)?;
            }
        }
        Ok(())
    }

    /// Close the connection. Later events are queued.
    pub async fn disconnect(&self) {
        // Dropping the sender ends the writer task, which closes the socket.
        self.outgoing_tx.lock().await.take();
        *self.state.write().await = ConnectionState::Disconnected;
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn peer_id(&self) -> Uuid {
        self.peer_id
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub async fn clock(&self) -> u64 {
        *self.clock.lock().await
    }

    pub async fn offline_queue_len(&self) -> usize {
        self.offline_queue.lock().await.len()
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn emit(&self, event: BoardEvent) -> Result<(), ProtocolError> {
        let clock = {
            let mut clock = self.clock.lock().await;
            *clock += 1;
            *clock
        };

        let sender = match self.connection_state().await {
            ConnectionState::Connected => self.outgoing_tx.lock().await.clone(),
            _ => None,
        };
        let Some(tx) = sender else {
            let mut queue = self.offline_queue.lock().await;
            if !queue.enqueue(clock, event) {
                return Err(ProtocolError::ConnectionClosed);
            }
            return Ok(());
        };

        let encoded = SyncMessage::new(self.peer_id, clock, event).encode()?;
        tx.send(encoded)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    async fn on(&self, event_name: &'static str) -> mpsc::Receiver<BoardEvent> {
        self.subscribers.subscribe(event_name).await
    }
}

/// Record `msg`'s clock and return how many events from its peer were
/// skipped since the last one seen.
fn note_clock(last_clock: &mut HashMap<Uuid, u64>, msg: &SyncMessage) -> u64 {
    if msg.peer_id.is_nil() {
        return 0;
    }
    let Some(previous) = last_clock.insert(msg.peer_id, msg.clock) else {
        return 0;
    };
    let missed = msg.clock.saturating_sub(previous.saturating_add(1));
    if missed > 0 {
        log::debug!(
            "Clock gap from {}: {} -> {} ({} events not seen)",
            msg.peer_id,
            previous,
            msg.clock,
            missed
        );
    }
    missed
}
