//! Minimal change sets between two versions of the same board.
//!
//! ```text
//!   old ──┐
//!         ├── compute_between ──▶ RemoteBoardDiff ──▶ wire
//!   new ──┘                              │
//!                                        ▼
//!   old ─────────────────────────── merged_with ──▶ new
//! ```
//!
//! Every field except `id` is optional or a (possibly empty) list, so an
//! empty diff carries only the board id and is never emitted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cells::{FogState, Highlight};
use crate::coordinates::{Location, Point};
use crate::error::{IdMismatchError, ValidationError};
use crate::grid::{Grid, GridSize};
use crate::remote::RemoteBoardModel;
use crate::token::TokenData;

/// A token that kept its definition and only changed tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMove {
    pub id: String,
    pub new_location: Location,
}

/// One overwritten grid cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellChange<T> {
    pub location: Location,
    pub new_value: T,
}

impl<T> CellChange<T> {
    pub fn new(location: Location, new_value: T) -> Self {
        Self {
            location,
            new_value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBoardDiff {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_source: Option<String>,
    #[serde(default)]
    pub tile_size: Option<u32>,
    #[serde(default)]
    pub grid_offset: Option<Point>,
    /// New `cols × rows`. Present whenever the grid was resized.
    #[serde(default)]
    pub size: Option<GridSize>,
    #[serde(default)]
    pub tokens_added: Vec<TokenData>,
    #[serde(default)]
    pub tokens_removed: Vec<String>,
    #[serde(default)]
    pub tokens_moved: Vec<TokenMove>,
    #[serde(default)]
    pub fog_of_war: Vec<CellChange<FogState>>,
    #[serde(default)]
    pub public_selection: Vec<CellChange<Highlight>>,
}

impl RemoteBoardDiff {
    /// A diff that changes nothing on board `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Compute the diff that turns `old` into `new`.
    ///
    /// Returns `Ok(None)` when the boards are equivalent. Tokens whose
    /// definition changed are expressed as a removal plus an addition of
    /// the same id; tokens that only changed location become moves.
    pub fn compute_between(
        new: &RemoteBoardModel,
        old: &RemoteBoardModel,
    ) -> Result<Option<Self>, IdMismatchError> {
        if new.id != old.id {
            return Err(IdMismatchError {
                expected: old.id.clone(),
                actual: new.id.clone(),
            });
        }

        let mut diff = Self::new(new.id.clone());
        diff.name = changed(&new.name, &old.name);
        diff.image_source = changed(&new.image_source, &old.image_source);
        diff.tile_size = changed(&new.tile_size, &old.tile_size);
        diff.grid_offset = changed(&new.grid_offset, &old.grid_offset);
        diff.size = changed(&new.size(), &old.size());

        let previous: HashMap<&str, &TokenData> =
            old.tokens.iter().map(|t| (t.id.as_str(), t)).collect();
        for token in &new.tokens {
            match previous.get(token.id.as_str()) {
                None => diff.tokens_added.push(token.clone()),
                Some(before) if !before.same_definition(token) => {
                    diff.tokens_removed.push(token.id.clone());
                    diff.tokens_added.push(token.clone());
                }
                Some(before) if before.location != token.location => match token.location {
                    Some(new_location) => diff.tokens_moved.push(TokenMove {
                        id: token.id.clone(),
                        new_location,
                    }),
                    None => {
                        diff.tokens_removed.push(token.id.clone());
                        diff.tokens_added.push(token.clone());
                    }
                },
                Some(_) => {}
            }
        }
        for token in &old.tokens {
            if !new.tokens.contains(&token.id) {
                diff.tokens_removed.push(token.id.clone());
            }
        }

        diff.fog_of_war = cell_changes(&new.fog_of_war, &old.fog_of_war);
        diff.public_selection = cell_changes(&new.public_selection, &old.public_selection);

        Ok(if diff.is_empty() { None } else { Some(diff) })
    }

    /// True when merging this diff would not change any board.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.image_source.is_none()
            && self.tile_size.is_none()
            && self.grid_offset.is_none()
            && self.size.is_none()
            && self.tokens_added.is_empty()
            && self.tokens_removed.is_empty()
            && self.tokens_moved.is_empty()
            && self.fog_of_war.is_empty()
            && self.public_selection.is_empty()
    }

    /// Shape check for diffs received from the network.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("id"));
        }
        if matches!(self.name.as_deref(), Some("")) {
            return Err(ValidationError::MissingField("name"));
        }
        if matches!(self.image_source.as_deref(), Some("")) {
            return Err(ValidationError::MissingField("imageSource"));
        }
        if let Some(tile_size) = self.tile_size {
            if tile_size < 1 {
                return Err(ValidationError::InvalidTileSize(tile_size));
            }
        }
        if let Some(size) = self.size {
            if !size.is_within_limits() {
                return Err(ValidationError::GridTooLarge {
                    cols: size.cols,
                    rows: size.rows,
                });
            }
        }
        for token in &self.tokens_added {
            token.validate_placed()?;
        }
        if self.tokens_removed.iter().any(String::is_empty)
            || self.tokens_moved.iter().any(|m| m.id.is_empty())
        {
            return Err(ValidationError::MissingField("token id"));
        }

        let cells = self
            .fog_of_war
            .iter()
            .map(|c| c.location)
            .chain(self.public_selection.iter().map(|c| c.location));
        for location in cells {
            if location.indices().is_none() {
                return Err(ValidationError::InvalidCell(location));
            }
        }
        if let Some(peeked) = self.fog_of_war.iter().find(|c| c.new_value == FogState::Peeked) {
            return Err(ValidationError::LocalFogState(peeked.location));
        }
        Ok(())
    }
}

fn changed<T: Clone + PartialEq>(new: &T, old: &T) -> Option<T> {
    (new != old).then(|| new.clone())
}

/// Cells of `new` whose value differs from `old`, including every cell
/// that lies outside `old`'s bounds.
fn cell_changes<T: Copy + PartialEq>(new: &Grid<T>, old: &Grid<T>) -> Vec<CellChange<T>> {
    new.cells()
        .filter(|(location, value)| old.get(*location) != Some(*value))
        .map(|(location, value)| CellChange::new(location, *value))
        .collect()
}
