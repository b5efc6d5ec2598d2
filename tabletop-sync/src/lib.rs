//! # tabletop-sync — Board synchronization over WebSockets
//!
//! Keeps every client's copy of a board in step by exchanging
//! `RemoteBoardDiff`s on a named-event channel, with a server that relays
//! diffs and owns persistence.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐                        ┌─────────────┐
//! │ RemoteBoard │                        │ SyncServer  │
//! │ (per board) │                        │ (central)   │
//! └──────┬──────┘                        └──────┬──────┘
//!        │                                      │
//!        ▼                                      ▼
//! ┌─────────────┐     WebSocket        ┌───────────────┐
//! │ BoardClient │ ◄──────────────────► │ BroadcastGroup│
//! │ WsTransport │   bincode frames     │ GameLoader    │
//! └─────────────┘                      └───────┬───────┘
//!                                              │
//!                                      ┌───────┴───────┐
//!                                      │ RecordBackend │
//!                                      │ (RocksDB)     │
//!                                      └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — Named board events and the binary `SyncMessage` envelope
//! - [`transport`] — The `Transport` seam and the in-process pair
//! - [`client`] — WebSocket transport with offline queue
//! - [`board_client`] — Typed requests over a transport
//! - [`remote_board`] — Per-board sync controller
//! - [`token_library`] — Memoized client copy of the token library
//! - [`broadcast`] — Namespace fan-out with backpressure
//! - [`server`] — WebSocket board server
//! - [`storage`] — Record backends, write-back cache, game loader

pub mod board_client;
pub mod broadcast;
pub mod client;
pub mod error;
pub mod protocol;
pub mod remote_board;
pub mod server;
pub mod storage;
pub mod token_library;
pub mod transport;

// Re-exports for convenience
pub use board_client::{BoardClient, BoardUpdates, ClientConfig};
pub use broadcast::{BroadcastGroup, BroadcastStats, ConnectedPeer, RoomManager};
pub use client::{ConnectionState, OfflineQueue, WsConfig, WsTransport};
pub use error::SyncError;
pub use protocol::{BoardEvent, ProtocolError, SyncMessage};
pub use remote_board::{RemoteBoard, SyncState, UpdateCallback};
pub use server::{ServerConfig, ServerStats, SyncServer};
pub use storage::{
    Family, GameLoader, MemoryBackend, Record, RecordBackend, RocksBackend, StorageCache, StoreConfig,
    StoreError,
};
pub use token_library::TokenLibrary;
pub use transport::{LocalTransport, Transport};
