//! Applying diffs to boards.

use crate::cells::{FogState, Highlight};
use crate::diff::{CellChange, RemoteBoardDiff};
use crate::error::IdMismatchError;
use crate::grid::Grid;
use crate::remote::RemoteBoardModel;

impl RemoteBoardModel {
    /// Produce a new board with `diff` applied; `self` is left untouched.
    ///
    /// Changes are applied in a fixed order: grid size, metadata, removed
    /// tokens, added tokens, moved tokens, then cell overwrites. A token
    /// that is removed and added in the same diff ends up with the added
    /// definition. Cells outside the (possibly resized) grid are skipped.
    /// A size over the grid limit is ignored, and peeked fog is stored as
    /// plain fog.
    pub fn merged_with(&self, diff: &RemoteBoardDiff) -> Result<Self, IdMismatchError> {
        if diff.id != self.id {
            return Err(IdMismatchError {
                expected: self.id.clone(),
                actual: diff.id.clone(),
            });
        }

        let mut merged = self.clone();

        if let Some(size) = diff.size.filter(|size| {
            let allowed = size.is_within_limits();
            if !allowed {
                log::warn!(
                    "Board {}: ignoring resize to {}x{}",
                    self.id,
                    size.cols,
                    size.rows
                );
            }
            allowed
        }) {
            merged.cols = size.cols;
            merged.rows = size.rows;
            merged.fog_of_war = merged.fog_of_war.resized(size.cols, size.rows, FogState::None);
            merged.public_selection =
                merged
                    .public_selection
                    .resized(size.cols, size.rows, Highlight::None);
        }
        if let Some(name) = &diff.name {
            merged.name = name.clone();
        }
        if let Some(image_source) = &diff.image_source {
            merged.image_source = image_source.clone();
        }
        if let Some(tile_size) = diff.tile_size {
            merged.tile_size = tile_size;
        }
        if let Some(offset) = diff.grid_offset {
            merged.grid_offset = offset;
        }

        for id in &diff.tokens_removed {
            merged.tokens.remove(id);
        }
        for token in &diff.tokens_added {
            merged.tokens.insert(token.clone());
        }
        for moved in &diff.tokens_moved {
            match merged.tokens.get_mut(&moved.id) {
                Some(token) => token.location = Some(moved.new_location),
                None => log::debug!("Board {}: ignoring move of unknown token {}", self.id, moved.id),
            }
        }

        let fog: Vec<CellChange<FogState>> = diff
            .fog_of_war
            .iter()
            .map(|c| CellChange::new(c.location, c.new_value.for_wire()))
            .collect();
        overwrite_cells(&self.id, "fogOfWar", &mut merged.fog_of_war, &fog);
        overwrite_cells(
            &self.id,
            "publicSelection",
            &mut merged.public_selection,
            &diff.public_selection,
        );

        Ok(merged)
    }
}

fn overwrite_cells<T: Copy>(board: &str, layer: &str, grid: &mut Grid<T>, changes: &[CellChange<T>]) {
    for change in changes {
        if !grid.set(change.location, change.new_value) {
            log::warn!(
                "Board {}: {} change at ({}, {}) is outside the grid",
                board,
                layer,
                change.location.col,
                change.location.row
            );
        }
    }
}
