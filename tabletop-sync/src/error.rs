use tabletop_core::{IdMismatchError, ValidationError};
use thiserror::Error;

use crate::protocol::ProtocolError;
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// A board, diff or token received from a peer failed validation.
    #[error("Invalid remote data: {0}")]
    InvalidRemoteData(#[source] ValidationError),
    #[error(transparent)]
    IdMismatch(#[from] IdMismatchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The server answered a request with an error.
    #[error("Server error: {0}")]
    Server(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),
}
