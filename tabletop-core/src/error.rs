use thiserror::Error;

use crate::coordinates::Location;

/// A received board, diff or token failed its shape check.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing or empty field: {0}")]
    MissingField(&'static str),
    #[error("Tile size must be at least 1, got {0}")]
    InvalidTileSize(u32),
    #[error("{layer} grid does not match board size {cols}x{rows}")]
    GridShape {
        layer: &'static str,
        cols: u32,
        rows: u32,
    },
    #[error("Grid size {cols}x{rows} exceeds the board limit")]
    GridTooLarge { cols: u32, rows: u32 },
    #[error("Peeked fog at ({}, {}) is local to one editor", .0.col, .0.row)]
    LocalFogState(Location),
    #[error("Token {0} must have size >= 1")]
    InvalidTokenSize(String),
    #[error("Token {0} has no board location")]
    UnplacedToken(String),
    #[error("Duplicate token id: {0}")]
    DuplicateToken(String),
    #[error("Invalid cell ({}, {})", .0.col, .0.row)]
    InvalidCell(Location),
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

/// A background or token image could not be loaded.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to load image {image}: {reason}")]
pub struct ImageLoadError {
    pub image: String,
    pub reason: String,
}

impl ImageLoadError {
    pub fn new(image: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            reason: reason.into(),
        }
    }
}

/// A diff was computed or merged against a board with a different id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Board id mismatch: expected {expected}, got {actual}")]
pub struct IdMismatchError {
    pub expected: String,
    pub actual: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    ImageLoad(#[from] ImageLoadError),
    #[error(transparent)]
    IdMismatch(#[from] IdMismatchError),
}
