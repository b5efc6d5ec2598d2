//! Wire and storage projection of a board.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::cells::{FogState, Highlight};
use crate::coordinates::Point;
use crate::error::ValidationError;
use crate::grid::{Grid, GridSize};
use crate::token::TokenSet;

/// The shared game state of a board: everything other clients and the
/// server need, and nothing that is local to one editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBoardModel {
    pub id: String,
    pub name: String,
    pub image_source: String,
    pub tile_size: u32,
    #[serde(default)]
    pub tokens: TokenSet,
    #[serde(default)]
    pub fog_of_war: Grid<FogState>,
    #[serde(default)]
    pub public_selection: Grid<Highlight>,
    #[serde(default)]
    pub grid_offset: Point,
    pub cols: u32,
    pub rows: u32,
}

impl RemoteBoardModel {
    /// A board with no tokens, no fog and no highlights.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        image_source: impl Into<String>,
        tile_size: u32,
        size: GridSize,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image_source: image_source.into(),
            tile_size,
            tokens: TokenSet::new(),
            fog_of_war: Grid::new(size.cols, size.rows, FogState::None),
            public_selection: Grid::new(size.cols, size.rows, Highlight::None),
            grid_offset: Point::default(),
            cols: size.cols,
            rows: size.rows,
        }
    }

    pub fn with_tokens(mut self, tokens: impl Into<TokenSet>) -> Self {
        self.tokens = tokens.into();
        self
    }

    pub fn size(&self) -> GridSize {
        GridSize::new(self.cols, self.rows)
    }

    /// Shape check applied before trusting any externally supplied board.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("id"));
        }
        if self.name.is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if self.image_source.is_empty() {
            return Err(ValidationError::MissingField("imageSource"));
        }
        if self.tile_size < 1 {
            return Err(ValidationError::InvalidTileSize(self.tile_size));
        }
        if !self.size().is_within_limits() {
            return Err(ValidationError::GridTooLarge {
                cols: self.cols,
                rows: self.rows,
            });
        }
        if !self.fog_of_war.has_shape(self.cols, self.rows) {
            return Err(ValidationError::GridShape {
                layer: "fogOfWar",
                cols: self.cols,
                rows: self.rows,
            });
        }
        if !self.public_selection.has_shape(self.cols, self.rows) {
            return Err(ValidationError::GridShape {
                layer: "publicSelection",
                cols: self.cols,
                rows: self.rows,
            });
        }

        let mut seen = HashSet::with_capacity(self.tokens.len());
        for token in &self.tokens {
            token.validate_placed()?;
            if !seen.insert(token.id.as_str()) {
                return Err(ValidationError::DuplicateToken(token.id.clone()));
            }
            if let Some(location) = token.location {
                if !self.size().contains(location) {
                    log::warn!(
                        "Token {} on board {} is outside the grid at ({}, {})",
                        token.id,
                        self.id,
                        location.col,
                        location.row
                    );
                }
            }
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Repair a loaded legacy record so that it has a chance to validate.
    ///
    /// Layers of the wrong shape are padded or truncated to `cols × rows`.
    /// Boards larger than the grid limit are left alone and stay invalid.
    pub fn fill_defaults(&mut self) {
        if !self.size().is_within_limits() {
            log::warn!(
                "Board {}: refusing to resize layers to {}x{}",
                self.id,
                self.cols,
                self.rows
            );
            return;
        }
        if !self.fog_of_war.has_shape(self.cols, self.rows) {
            log::debug!("Board {}: resetting fog of war grid shape", self.id);
            self.fog_of_war = self.fog_of_war.resized(self.cols, self.rows, FogState::None);
        }
        if !self.public_selection.has_shape(self.cols, self.rows) {
            log::debug!("Board {}: resetting public selection grid shape", self.id);
            self.public_selection =
                self.public_selection
                    .resized(self.cols, self.rows, Highlight::None);
        }
    }
}
