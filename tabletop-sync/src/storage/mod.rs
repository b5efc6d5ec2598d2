//! Persistent storage for boards and the token library.
//!
//! Architecture:
//! ```text
//! ┌─────────────┐   diffs    ┌──────────────┐  dirty records  ┌───────────────┐
//! │ SyncServer  │ ─────────► │  GameLoader  │ ──────────────► │ RecordBackend │
//! └─────────────┘            │ StorageCache │  (periodic      │ Rocks / Memory│
//!                            └──────────────┘   flush)        └───────┬───────┘
//!                                                                     │
//!                              ┌──────────────────────────────────────┴──┐
//!                              │ "boards" — RemoteBoardModel per id      │
//!                              │ "tokens" — library TokenData per id     │
//!                              │ "meta"   — active.db, all_boards.db     │
//!                              └─────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod cache;
pub mod loader;
pub mod rocks;

pub use backend::{Family, MemoryBackend, RecordBackend, RecordWrite, StoreError};
pub use cache::{Record, StorageCache};
pub use loader::GameLoader;
pub use rocks::{RocksBackend, StoreConfig};
