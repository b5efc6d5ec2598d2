//! Binary protocol for board events.
//!
//! Wire format (bincode-encoded, one WebSocket binary frame per message):
//! ```text
//! ┌───────────┬──────────┬────────────────────────────────┐
//! │ peer_id   │ clock    │ event                          │
//! │ 16 bytes  │ varint   │ variant index + payload        │
//! └───────────┴──────────┴────────────────────────────────┘
//! ```
//!
//! Events are named the same on every transport; `BoardEvent::name` is the
//! routing key used by subscribers.

use serde::{Deserialize, Serialize};
use tabletop_core::{RemoteBoardDiff, RemoteBoardModel, TokenData};
use uuid::Uuid;

pub const BOARD_UPDATE: &str = "board-update";
pub const BOARD_CREATE_REQUEST: &str = "board-create-request";
pub const BOARD_GET_REQUEST: &str = "board-get-request";
pub const BOARD_GET_RESPONSE: &str = "board-get-response";
pub const BOARD_GET_ERROR: &str = "board-get-error";
pub const BOARD_GET_ALL_REQUEST: &str = "board-get-all-request";
pub const BOARD_GET_ALL_RESPONSE: &str = "board-get-all-response";
pub const BOARD_GET_ACTIVE_REQUEST: &str = "board-get-active-request";
pub const BOARD_GET_ACTIVE_RESPONSE: &str = "board-get-active-response";
pub const BOARD_SET_ACTIVE: &str = "board-set-active";
pub const TOKENS_GET_ALL_REQUEST: &str = "tokens-get-all-request";
pub const TOKENS_GET_ALL_RESPONSE: &str = "tokens-get-all-response";

/// One named event on the board channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoardEvent {
    /// Incremental change, either direction
    Update(RemoteBoardDiff),
    /// Persist a brand-new board
    CreateRequest(RemoteBoardModel),
    /// Request a full snapshot by board id
    GetRequest(String),
    GetResponse(RemoteBoardModel),
    /// The requested board could not be loaded
    GetError(String),
    GetAllRequest,
    GetAllResponse(Vec<String>),
    GetActiveRequest,
    /// `None` when no board has been marked active
    GetActiveResponse(Option<String>),
    SetActive(String),
    TokensGetAllRequest,
    TokensGetAllResponse(Vec<TokenData>),
}

impl BoardEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Update(_) => BOARD_UPDATE,
            Self::CreateRequest(_) => BOARD_CREATE_REQUEST,
            Self::GetRequest(_) => BOARD_GET_REQUEST,
            Self::GetResponse(_) => BOARD_GET_RESPONSE,
            Self::GetError(_) => BOARD_GET_ERROR,
            Self::GetAllRequest => BOARD_GET_ALL_REQUEST,
            Self::GetAllResponse(_) => BOARD_GET_ALL_RESPONSE,
            Self::GetActiveRequest => BOARD_GET_ACTIVE_REQUEST,
            Self::GetActiveResponse(_) => BOARD_GET_ACTIVE_RESPONSE,
            Self::SetActive(_) => BOARD_SET_ACTIVE,
            Self::TokensGetAllRequest => TOKENS_GET_ALL_REQUEST,
            Self::TokensGetAllResponse(_) => TOKENS_GET_ALL_RESPONSE,
        }
    }
}

/// Top-level protocol message.
///
/// `clock` is a per-sender counter. It is only used to log gaps; events are
/// applied in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub peer_id: Uuid,
    pub clock: u64,
    pub event: BoardEvent,
}

impl SyncMessage {
    pub fn new(peer_id: Uuid, clock: u64, event: BoardEvent) -> Self {
        Self {
            peer_id,
            clock,
            event,
        }
    }

    /// A message sent by the server itself.
    pub fn from_server(event: BoardEvent) -> Self {
        Self::new(Uuid::nil(), 0, event)
    }

    pub fn name(&self) -> &'static str {
        self.event.name()
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(msg)
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    UnexpectedEvent(&'static str),
    ConnectionClosed,
    Timeout,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::UnexpectedEvent(name) => write!(f, "Unexpected event: {name}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::Timeout => write!(f, "Connection timeout"),
        }
    }
}

impl std::error::Error for ProtocolError {}
