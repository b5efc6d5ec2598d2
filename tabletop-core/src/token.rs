//! Game pieces and the id-keyed token collection of a board.

use serde::{Deserialize, Serialize};

use crate::coordinates::Location;
use crate::error::ValidationError;
use crate::grid::SimpleArea;

/// Movement allowance used when a stored token has none.
pub const DEFAULT_SPEED: u32 = 6;

fn default_size() -> u32 {
    1
}

fn default_speed() -> u32 {
    DEFAULT_SPEED
}

/// A movable game piece.
///
/// `location` is set when the token is placed on a board and absent for
/// token-library entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenData {
    pub id: String,
    pub name: String,
    pub image_source: String,
    #[serde(default = "default_size")]
    pub size: u32,
    #[serde(default = "default_speed")]
    pub speed: u32,
    #[serde(default)]
    pub location: Option<Location>,
}

impl TokenData {
    /// Create an unplaced token with the default speed.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        image_source: impl Into<String>,
        size: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image_source: image_source.into(),
            size,
            speed: DEFAULT_SPEED,
            location: None,
        }
    }

    pub fn placed_at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_speed(mut self, speed: u32) -> Self {
        self.speed = speed;
        self
    }

    /// Shape check for a token definition (placement not required).
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("token.id"));
        }
        if self.name.is_empty() {
            return Err(ValidationError::MissingField("token.name"));
        }
        if self.image_source.is_empty() {
            return Err(ValidationError::MissingField("token.imageSource"));
        }
        if self.size < 1 {
            return Err(ValidationError::InvalidTokenSize(self.id.clone()));
        }
        Ok(())
    }

    /// Shape check for a token that sits on a board.
    pub fn validate_placed(&self) -> Result<(), ValidationError> {
        self.validate()?;
        if self.location.is_none() {
            return Err(ValidationError::UnplacedToken(self.id.clone()));
        }
        Ok(())
    }

    /// Repair a stored legacy token. Only a zero size can be fixed.
    pub fn fill_defaults(&mut self) {
        if self.size < 1 {
            self.size = 1;
        }
    }

    /// Library copy of this token, without a board placement.
    pub fn definition(&self) -> TokenData {
        TokenData {
            location: None,
            ..self.clone()
        }
    }

    /// Whether everything except the placement is equal.
    pub fn same_definition(&self, other: &TokenData) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.image_source == other.image_source
            && self.size == other.size
            && self.speed == other.speed
    }

    /// Cells covered by this token: `size × size` anchored at its location.
    pub fn occupied_area(&self) -> Option<SimpleArea> {
        let start = self.location?;
        let extent = self.size.max(1) as i32 - 1;
        Some(SimpleArea::new(
            start,
            Location::new(start.col + extent, start.row + extent),
        ))
    }

    /// Whether an item of `size` placed at `target` would overlap this token.
    pub fn overlaps(&self, target: Location, size: u32) -> bool {
        let Some(location) = self.location else {
            return false;
        };
        let size = size as i32;
        let own = self.size as i32;
        let cols_disjoint =
            target.col >= location.col + own || target.col + size <= location.col;
        let rows_disjoint =
            target.row >= location.row + own || target.row + size <= location.row;
        !cols_disjoint && !rows_disjoint
    }
}

/// Tokens of one board, in draw order.
///
/// Ids are unique within a valid set. Equality ignores order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSet {
    tokens: Vec<TokenData>,
}

impl TokenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TokenData> {
        self.tokens.iter()
    }

    pub fn get(&self, id: &str) -> Option<&TokenData> {
        self.tokens.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TokenData> {
        self.tokens.iter_mut().find(|t| t.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Insert a token, replacing (in place) any token with the same id.
    pub fn insert(&mut self, token: TokenData) -> Option<TokenData> {
        match self.get_mut(&token.id) {
            Some(existing) => Some(std::mem::replace(existing, token)),
            None => {
                self.tokens.push(token);
                None
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<TokenData> {
        let index = self.tokens.iter().position(|t| t.id == id)?;
        Some(self.tokens.remove(index))
    }

    pub fn as_slice(&self) -> &[TokenData] {
        &self.tokens
    }

    pub fn into_vec(self) -> Vec<TokenData> {
        self.tokens
    }
}

impl PartialEq for TokenSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.iter().all(|t| other.get(&t.id) == Some(t))
            && other.iter().all(|t| self.get(&t.id) == Some(t))
    }
}

impl From<Vec<TokenData>> for TokenSet {
    fn from(tokens: Vec<TokenData>) -> Self {
        Self { tokens }
    }
}

impl FromIterator<TokenData> for TokenSet {
    fn from_iter<I: IntoIterator<Item = TokenData>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a TokenSet {
    type Item = &'a TokenData;
    type IntoIter = std::slice::Iter<'a, TokenData>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}
