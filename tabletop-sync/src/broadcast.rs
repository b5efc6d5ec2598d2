//! Fan-out of board events to every connection in a namespace.
//!
//! One tokio broadcast channel per room. Each connection holds its own
//! receiver buffering up to `capacity` frames; a connection that falls
//! further behind loses the oldest frames.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::protocol::{ProtocolError, SyncMessage};

/// A frame as handed to every receiver in a room.
#[derive(Debug)]
pub struct Outbound {
    /// Connection that produced the event. Receivers skip their own.
    pub origin: Uuid,
    pub frame: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ConnectedPeer {
    pub conn_id: Uuid,
    pub remote_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_peers: usize,
}

#[derive(Default)]
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

pub struct BroadcastGroup {
    sender: broadcast::Sender<Arc<Outbound>>,
    peers: RwLock<HashMap<Uuid, ConnectedPeer>>,
    capacity: usize,
    atomic_stats: AtomicBroadcastStats,
}

impl BroadcastGroup {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            peers: RwLock::new(HashMap::new()),
            capacity,
            atomic_stats: AtomicBroadcastStats::default(),
        }
    }

    /// Register a connection and return its receiver.
    pub async fn add_peer(&self, peer: ConnectedPeer) -> broadcast::Receiver<Arc<Outbound>> {
        let mut peers = self.peers.write().await;
        peers.insert(peer.conn_id, peer);
        self.sender.subscribe()
    }

    pub async fn remove_peer(&self, conn_id: &Uuid) -> Option<ConnectedPeer> {
        self.peers.write().await.remove(conn_id)
    }

    /// Encode `msg` once and send it to every receiver, the origin included.
    /// Returns the number of receivers.
    pub fn broadcast(&self, origin: Uuid, msg: &SyncMessage) -> Result<usize, ProtocolError> {
        let frame = msg.encode()?;
        Ok(self.broadcast_raw(origin, frame))
    }

    pub fn broadcast_raw(&self, origin: Uuid, frame: Vec<u8>) -> usize {
        let count = self
            .sender
            .send(Arc::new(Outbound { origin, frame }))
            .unwrap_or(0);
        self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Record frames a lagging receiver never saw.
    pub fn record_dropped(&self, count: u64) {
        self.atomic_stats
            .messages_dropped
            .fetch_add(count, Ordering::Relaxed);
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn peers(&self) -> Vec<ConnectedPeer> {
        self.peers.read().await.values().cloned().collect()
    }

    pub async fn has_peer(&self, conn_id: &Uuid) -> bool {
        self.peers.read().await.contains_key(conn_id)
    }

    pub async fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.atomic_stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.atomic_stats.messages_dropped.load(Ordering::Relaxed),
            active_peers: self.peer_count().await,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// A receiver not tied to any registered peer.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Outbound>> {
        self.sender.subscribe()
    }
}

/// Maps namespaces (for example `/board`) to their broadcast groups.
pub struct RoomManager {
    rooms: RwLock<HashMap<String, Arc<BroadcastGroup>>>,
    default_capacity: usize,
}

impl RoomManager {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            default_capacity,
        }
    }

    pub async fn get_or_create(&self, namespace: &str) -> Arc<BroadcastGroup> {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(namespace) {
                return room.clone();
            }
        }

        let mut rooms = self.rooms.write().await;
        // Double-check after acquiring write lock
        if let Some(room) = rooms.get(namespace) {
            return room.clone();
        }
        log::debug!("Opening room {namespace}");
        let room = Arc::new(BroadcastGroup::new(self.default_capacity));
        rooms.insert(namespace.to_string(), room.clone());
        room
    }

    pub async fn get(&self, namespace: &str) -> Option<Arc<BroadcastGroup>> {
        self.rooms.read().await.get(namespace).cloned()
    }

    pub async fn remove_if_empty(&self, namespace: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(namespace) {
            if room.peer_count().await == 0 {
                rooms.remove(namespace);
                log::debug!("Closed empty room {namespace}");
                return true;
            }
        }
        false
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn namespaces(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }
}
