//! WebSocket board server.
//!
//! Architecture:
//! ```text
//! Client A ──┐                      ┌──► GameLoader ──► RecordBackend
//!            ├── Room ("/board") ───┤     (boards, tokens, active id)
//! Client B ──┘        │             └──► BroadcastGroup
//!                     │                        │
//!                     └────────────┬───────────┘
//!                                  ▼
//!                     every client except the sender
//! ```
//!
//! A `board-update` is validated, broadcast, then merged into the stored
//! board. Requests are answered to the requesting connection only.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::broadcast::{BroadcastGroup, ConnectedPeer, RoomManager};
use crate::error::SyncError;
use crate::protocol::{BoardEvent, ProtocolError, SyncMessage};
use crate::storage::{GameLoader, RocksBackend, StoreConfig, StoreError};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Request path clients connect on
    pub namespace: String,
    /// Maximum connections per namespace
    pub max_peers_per_room: usize,
    /// Broadcast channel capacity per room
    pub broadcast_capacity: usize,
    /// RocksDB directory (None = in-memory only)
    pub storage_path: Option<PathBuf>,
    /// Seconds between flushes of dirty records
    pub flush_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            namespace: "/board".to_string(),
            max_peers_per_room: 100,
            broadcast_capacity: 256,
            storage_path: None,
            flush_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub rejected_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub updates_broadcast: u64,
    pub rejected_payloads: u64,
    pub flushed_records: u64,
}

pub struct SyncServer {
    config: Arc<ServerConfig>,
    rooms: Arc<RoomManager>,
    game: Arc<Mutex<GameLoader>>,
    stats: Arc<RwLock<ServerStats>>,
}

/// Everything a connection task needs.
#[derive(Clone)]
struct ConnectionContext {
    config: Arc<ServerConfig>,
    rooms: Arc<RoomManager>,
    game: Arc<Mutex<GameLoader>>,
    stats: Arc<RwLock<ServerStats>>,
}

impl SyncServer {
    /// Open storage as configured and build the server.
    pub fn new(config: ServerConfig) -> Result<Self, SyncError> {
        let game = match &config.storage_path {
            Some(path) => {
                let backend = RocksBackend::open(StoreConfig::at(path.clone()))?;
                GameLoader::open(Arc::new(backend))?
            }
            None => GameLoader::in_memory(),
        };
        Ok(Self::with_loader(config, game))
    }

    pub fn with_loader(config: ServerConfig, game: GameLoader) -> Self {
        Self {
            rooms: Arc::new(RoomManager::new(config.broadcast_capacity)),
            config: Arc::new(config),
            game: Arc::new(Mutex::new(game)),
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Create with default configuration (in-memory, no persistence).
    pub fn with_defaults() -> Self {
        Self::with_loader(ServerConfig::default(), GameLoader::in_memory())
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<(), SyncError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), SyncError> {
        log::info!(
            "Board server listening on {} (namespace {})",
            listener.local_addr()?,
            self.config.namespace
        );
        let flusher = self.spawn_flush_task();

        let result = loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => break Err(e.into()),
            };
            log::debug!("New TCP connection from {addr}");

            let ctx = self.context();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, ctx).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        };

        flusher.abort();
        result
    }

    /// Persist every dirty record now.
    pub async fn flush(&self) -> Result<usize, StoreError> {
        flush_game(&self.game, &self.stats).await
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn room_manager(&self) -> &Arc<RoomManager> {
        &self.rooms
    }

    /// Shared handle to the game state.
    pub fn game(&self) -> Arc<Mutex<GameLoader>> {
        self.game.clone()
    }

    fn context(&self) -> ConnectionContext {
        ConnectionContext {
            config: self.config.clone(),
            rooms: self.rooms.clone(),
            game: self.game.clone(),
            stats: self.stats.clone(),
        }
    }

    fn spawn_flush_task(&self) -> tokio::task::JoinHandle<()> {
        let game = self.game.clone();
        let stats = self.stats.clone();
        let period = Duration::from_secs(self.config.flush_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = flush_game(&game, &stats).await {
                    log::error!("Periodic flush failed: {e}");
                }
            }
        })
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        ctx: ConnectionContext,
    ) -> Result<(), SyncError> {
        let mut path = String::new();
        let namespace = ctx.config.namespace.clone();
        let ws_stream = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                path = req.uri().path().to_string();
                if path != namespace {
                    let mut error = ErrorResponse::new(Some(format!("unknown namespace {path}")));
                    *error.status_mut() = StatusCode::NOT_FOUND;
                    return Err(error);
                }
                Ok(resp)
            },
        )
        .await
        .map_err(|e| {
            log::warn!("Handshake with {addr} failed: {e}");
            ProtocolError::ConnectionClosed
        })?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let room = ctx.rooms.get_or_create(&path).await;
        if room.peer_count().await >= ctx.config.max_peers_per_room {
            log::warn!("Room {path} is full, refusing {addr}");
            ctx.stats.write().await.rejected_connections += 1;
            let _ = ws_sender.send(Message::Close(None)).await;
            return Ok(());
        }

        let conn_id = Uuid::new_v4();
        let mut broadcast_rx = room
            .add_peer(ConnectedPeer {
                conn_id,
                remote_addr: Some(addr),
            })
            .await;
        {
            let mut s = ctx.stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }
        log::info!("Connection {conn_id} from {addr} joined {path}");

        let result: Result<(), SyncError> = async {
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Binary(data))) => {
                                {
                                    let mut s = ctx.stats.write().await;
                                    s.total_messages += 1;
                                    s.total_bytes += data.len() as u64;
                                }
                                let sync_msg = match SyncMessage::decode(&data) {
                                    Ok(sync_msg) => sync_msg,
                                    Err(e) => {
                                        log::warn!("Failed to decode message from {addr}: {e}");
                                        continue;
                                    }
                                };
                                log::debug!("{} from {conn_id}", sync_msg.name());
                                if let Some(reply) =
                                    Self::handle_event(&ctx, &room, conn_id, sync_msg).await
                                {
                                    send_frame(&mut ws_sender, SyncMessage::from_server(reply).encode()?)
                                        .await?;
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                ws_sender
                                    .send(Message::Pong(data))
                                    .await
                                    .map_err(|_| ProtocolError::ConnectionClosed)?;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                log::info!("Connection {conn_id} closed");
                                break;
                            }
                            Some(Err(e)) => {
                                log::error!("WebSocket error from {addr}: {e}");
                                break;
                            }
                            _ => {}
                        }
                    }

                    outbound = broadcast_rx.recv() => {
                        match outbound {
                            Ok(outbound) => {
                                if outbound.origin == conn_id {
                                    continue; // Skip own messages
                                }
                                send_frame(&mut ws_sender, outbound.frame.clone()).await?;
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                log::warn!("Connection {conn_id} lagged by {n} messages");
                                room.record_dropped(n);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
            Ok(())
        }
        .await;

        room.remove_peer(&conn_id).await;
        ctx.rooms.remove_if_empty(&path).await;
        {
            let mut s = ctx.stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
        }
        result
    }

    /// Apply one inbound event. Returns the reply for the sender, if any.
    async fn handle_event(
        ctx: &ConnectionContext,
        room: &BroadcastGroup,
        conn_id: Uuid,
        msg: SyncMessage,
    ) -> Option<BoardEvent> {
        match msg.event {
            BoardEvent::Update(diff) => {
                if let Err(e) = diff.validate() {
                    log::warn!("Rejecting update for board {} from {conn_id}: {e}", diff.id);
                    ctx.stats.write().await.rejected_payloads += 1;
                    return None;
                }

                let relay = SyncMessage::new(conn_id, msg.clock, BoardEvent::Update(diff));
                match room.broadcast(conn_id, &relay) {
                    Ok(_) => ctx.stats.write().await.updates_broadcast += 1,
                    Err(e) => log::error!("Failed to broadcast update: {e}"),
                }

                let BoardEvent::Update(diff) = relay.event else {
                    return None;
                };
                if let Err(e) = ctx.game.lock().await.update_board(&diff) {
                    log::error!("Failed to store update for board {}: {e}", diff.id);
                }
                None
            }

            BoardEvent::CreateRequest(mut model) => {
                if let Err(e) = model.validate() {
                    log::debug!("New board {} invalid ({e}), filling defaults", model.id);
                    model.fill_defaults();
                    if let Err(e) = model.validate() {
                        log::warn!("Ignoring invalid new board {} from {conn_id}: {e}", model.id);
                        ctx.stats.write().await.rejected_payloads += 1;
                        return None;
                    }
                }
                if let Err(e) = ctx.game.lock().await.create_new_board(model) {
                    log::error!("Failed to create board: {e}");
                }
                None
            }

            BoardEvent::GetRequest(board_id) => {
                match ctx.game.lock().await.retrieve_board(&board_id) {
                    Ok(model) => Some(BoardEvent::GetResponse(model)),
                    Err(e) => {
                        log::info!("Board {board_id} requested by {conn_id} unavailable: {e}");
                        Some(BoardEvent::GetError(e.to_string()))
                    }
                }
            }

            BoardEvent::GetAllRequest => Some(BoardEvent::GetAllResponse(
                ctx.game.lock().await.all_board_ids().to_vec(),
            )),

            BoardEvent::GetActiveRequest => Some(BoardEvent::GetActiveResponse(
                ctx.game.lock().await.active_board().map(str::to_string),
            )),

            BoardEvent::SetActive(board_id) => {
                if let Err(e) = ctx.game.lock().await.set_active_board(&board_id) {
                    log::error!("Failed to set active board {board_id}: {e}");
                }
                None
            }

            BoardEvent::TokensGetAllRequest => {
                let tokens = ctx.game.lock().await.get_all_tokens().unwrap_or_else(|e| {
                    log::error!("Failed to load token library: {e}");
                    Vec::new()
                });
                Some(BoardEvent::TokensGetAllResponse(tokens))
            }

            other => {
                log::debug!("Ignoring {} sent by client {conn_id}", other.name());
                None
            }
        }
    }
}

async fn flush_game(
    game: &Mutex<GameLoader>,
    stats: &RwLock<ServerStats>,
) -> Result<usize, StoreError> {
    let flushed = game.lock().await.flush()?;
    stats.write().await.flushed_records += flushed as u64;
    Ok(flushed)
}

async fn send_frame<S>(sink: &mut S, frame: Vec<u8>) -> Result<(), ProtocolError>
where
    S: Sink<Message> + Unpin,
{
    sink.send(Message::Binary(frame.into()))
        .await
        .map_err(|_| ProtocolError::ConnectionClosed)
}
