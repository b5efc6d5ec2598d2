//! Per-cell values of the fog-of-war and highlight layers.

use serde::{Deserialize, Serialize};

/// Visibility of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FogState {
    #[default]
    #[serde(rename = "0", alias = "False")]
    None,
    #[serde(rename = "1", alias = "True")]
    Full,
    /// Fogged, but temporarily revealed to the local editor.
    #[serde(rename = "2")]
    Peeked,
}

impl FogState {
    pub fn is_fogged(self) -> bool {
        self != FogState::None
    }

    /// The value other clients see: peeking is local only.
    pub fn for_wire(self) -> Self {
        match self {
            FogState::Peeked => FogState::Full,
            other => other,
        }
    }
}

/// Highlight color of one cell, shared with every viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Highlight {
    #[default]
    #[serde(rename = "0")]
    None,
    #[serde(rename = "1")]
    Blue,
    #[serde(rename = "2")]
    Orange,
    #[serde(rename = "3")]
    Green,
}
