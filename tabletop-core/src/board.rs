//! In-memory board used for editing.
//!
//! ```text
//!  RemoteBoardModel ──create_from_remote──▶ BoardModel ──to_remote──▶ RemoteBoardModel
//!                         (loads images)      │  ▲
//!                                             ▼  │ UI mutations
//!                                       local selection,
//!                                       peeked fog, images
//! ```
//!
//! Unlike the remote projection, a `BoardModel` knows the loaded background,
//! so its grid size is always derived from the image, tile size and offset.

use std::collections::HashMap;

use crate::cells::{FogState, Highlight};
use crate::coordinates::{Location, Point};
use crate::error::{BoardError, ImageLoadError, ValidationError};
use crate::grid::{apply_area, grid_dimensions, Grid, GridSize, SimpleArea};
use crate::image::{load_images, ImageLoader, LoadedImage};
use crate::remote::RemoteBoardModel;
use crate::token::{TokenData, TokenSet};

#[derive(Debug, Clone, PartialEq)]
pub struct BoardModel {
    id: String,
    name: String,
    background: LoadedImage,
    tile_size: u32,
    grid_offset: Point,
    size: GridSize,
    tokens: TokenSet,
    token_images: HashMap<String, LoadedImage>,
    fog_of_war: Grid<FogState>,
    public_selection: Grid<Highlight>,
    local_selection: Grid<bool>,
}

impl BoardModel {
    /// Hydrate a board from its remote projection.
    ///
    /// The background and every token image are loaded concurrently before
    /// anything is built; a single failed load fails the whole board.
    pub async fn create_from_remote(
        remote: &RemoteBoardModel,
        loader: &dyn ImageLoader,
    ) -> Result<Self, BoardError> {
        remote.validate()?;

        let sources = remote
            .tokens
            .iter()
            .map(|t| t.image_source.as_str())
            .chain(std::iter::once(remote.image_source.as_str()));
        let images = load_images(loader, sources).await?;
        let background = images
            .get(&remote.image_source)
            .cloned()
            .ok_or_else(|| ImageLoadError::new(&remote.image_source, "not loaded"))?;

        let mut board = Self::empty(
            remote.id.clone(),
            remote.name.clone(),
            background,
            remote.tile_size,
            remote.grid_offset,
        );
        board.tokens = remote.tokens.clone();
        board.token_images = images;
        board.fog_of_war = remote
            .fog_of_war
            .resized(board.size.cols, board.size.rows, FogState::None);
        board.public_selection =
            remote
                .public_selection
                .resized(board.size.cols, board.size.rows, Highlight::None);

        if board.size != remote.size() {
            log::debug!(
                "Board {}: stored size {}x{} differs from image size {}x{}",
                board.id,
                remote.cols,
                remote.rows,
                board.size.cols,
                board.size.rows
            );
        }
        Ok(board)
    }

    /// A fresh board with a new id and empty layers.
    pub fn new_board(
        name: impl Into<String>,
        background: LoadedImage,
        tile_size: u32,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if background.source.is_empty() {
            return Err(ValidationError::MissingField("imageSource"));
        }
        if tile_size < 1 {
            return Err(ValidationError::InvalidTileSize(tile_size));
        }
        let id = uuid::Uuid::new_v4().to_string();
        log::info!("Creating new board {} ({})", name, id);
        Ok(Self::empty(id, name, background, tile_size, Point::default()))
    }

    fn empty(
        id: String,
        name: String,
        background: LoadedImage,
        tile_size: u32,
        grid_offset: Point,
    ) -> Self {
        let tile_size = tile_size.max(1);
        let grid_offset = checked_offset(&id, grid_offset, tile_size);
        let size = derived_size(&background, tile_size, grid_offset);
        Self {
            id,
            name,
            background,
            tile_size,
            grid_offset,
            size,
            tokens: TokenSet::new(),
            token_images: HashMap::new(),
            fog_of_war: Grid::new(size.cols, size.rows, FogState::None),
            public_selection: Grid::new(size.cols, size.rows, Highlight::None),
            local_selection: Grid::new(size.cols, size.rows, false),
        }
    }

    /// Project to the wire format. Peeked fog is sent as full fog and the
    /// local selection is dropped.
    pub fn to_remote(&self) -> RemoteBoardModel {
        RemoteBoardModel {
            id: self.id.clone(),
            name: self.name.clone(),
            image_source: self.background.source.clone(),
            tile_size: self.tile_size,
            tokens: self.tokens.clone(),
            fog_of_war: self.fog_of_war.map(|f| f.for_wire()),
            public_selection: self.public_selection.clone(),
            grid_offset: self.grid_offset,
            cols: self.size.cols,
            rows: self.size.rows,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        self.name = name;
        Ok(())
    }

    pub fn background(&self) -> &LoadedImage {
        &self.background
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn grid_offset(&self) -> Point {
        self.grid_offset
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    pub fn tokens(&self) -> &TokenSet {
        &self.tokens
    }

    pub fn token_image(&self, source: &str) -> Option<&LoadedImage> {
        self.token_images.get(source)
    }

    pub fn fog_of_war(&self) -> &Grid<FogState> {
        &self.fog_of_war
    }

    pub fn public_selection(&self) -> &Grid<Highlight> {
        &self.public_selection
    }

    /// Selected cells, column-major.
    pub fn local_selection(&self) -> Vec<Location> {
        self.local_selection
            .cells()
            .filter(|(_, selected)| **selected)
            .map(|(location, _)| location)
            .collect()
    }

    /// Change the tile size and optionally the background, re-deriving the
    /// grid. Cell values at unchanged coordinates survive.
    pub fn update_grid_parameters(
        &mut self,
        tile_size: u32,
        background: Option<LoadedImage>,
    ) -> Result<(), ValidationError> {
        if tile_size < 1 {
            return Err(ValidationError::InvalidTileSize(tile_size));
        }
        if let Some(background) = background {
            if background.source.is_empty() {
                return Err(ValidationError::MissingField("imageSource"));
            }
            self.background = background;
        }
        self.tile_size = tile_size;
        self.grid_offset = checked_offset(&self.id, self.grid_offset, tile_size);
        self.resize_layers();
        Ok(())
    }

    /// Shift the grid. The offset is wrapped into `[0, tile_size)`.
    pub fn set_grid_offset(&mut self, offset: Point) {
        let tile = f64::from(self.tile_size);
        self.grid_offset = Point::new(offset.x.rem_euclid(tile), offset.y.rem_euclid(tile));
        self.resize_layers();
    }

    fn resize_layers(&mut self) {
        let size = derived_size(&self.background, self.tile_size, self.grid_offset);
        if size == self.size {
            return;
        }
        log::debug!(
            "Board {}: grid resized {}x{} -> {}x{}",
            self.id,
            self.size.cols,
            self.size.rows,
            size.cols,
            size.rows
        );
        self.size = size;
        self.fog_of_war = self.fog_of_war.resized(size.cols, size.rows, FogState::None);
        self.public_selection = self
            .public_selection
            .resized(size.cols, size.rows, Highlight::None);
        self.local_selection = self.local_selection.resized(size.cols, size.rows, false);
    }

    /// Place a new token. `image` is the token's loaded image.
    pub fn add_token(&mut self, token: TokenData, image: LoadedImage) -> Result<(), ValidationError> {
        token.validate_placed()?;
        if self.tokens.contains(&token.id) {
            return Err(ValidationError::DuplicateToken(token.id));
        }
        self.token_images.insert(image.source.clone(), image);
        self.tokens.insert(token);
        Ok(())
    }

    pub fn remove_token(&mut self, id: &str) -> Option<TokenData> {
        self.tokens.remove(id)
    }

    /// Returns false when no token has the given id.
    pub fn move_token(&mut self, id: &str, location: Location) -> bool {
        match self.tokens.get_mut(id) {
            Some(token) => {
                token.location = Some(location);
                true
            }
            None => false,
        }
    }

    pub fn set_fog(&mut self, location: Location, state: FogState) -> bool {
        self.fog_of_war.set(location, state)
    }

    pub fn paint_fog(&mut self, area: &SimpleArea, state: FogState) {
        self.fog_of_war = apply_area(&self.fog_of_war, area, state);
    }

    pub fn set_highlight(&mut self, location: Location, highlight: Highlight) -> bool {
        self.public_selection.set(location, highlight)
    }

    pub fn paint_highlight(&mut self, area: &SimpleArea, highlight: Highlight) {
        self.public_selection = apply_area(&self.public_selection, area, highlight);
    }

    /// Flip one cell of the local selection. Returns false when out of bounds.
    pub fn toggle_local_selection(&mut self, location: Location) -> bool {
        match self.local_selection.get(location).copied() {
            Some(selected) => self.local_selection.set(location, !selected),
            None => false,
        }
    }

    pub fn clear_local_selection(&mut self) {
        self.local_selection = Grid::new(self.size.cols, self.size.rows, false);
    }

    /// Tokens an item of `size` at `target` would overlap.
    pub fn colliding_tokens(&self, target: Location, size: u32) -> Vec<&TokenData> {
        self.tokens
            .iter()
            .filter(|token| token.overlaps(target, size))
            .collect()
    }
}

fn derived_size(background: &LoadedImage, tile_size: u32, offset: Point) -> GridSize {
    grid_dimensions(background.width, background.height, tile_size, offset).unwrap_or_default()
}

fn checked_offset(board: &str, offset: Point, tile_size: u32) -> Point {
    let tile = f64::from(tile_size);
    let valid = (0.0..tile).contains(&offset.x) && (0.0..tile).contains(&offset.y);
    if valid {
        offset
    } else {
        log::info!(
            "Board {}: grid offset ({}, {}) invalid for tile size {}, ignoring",
            board,
            offset.x,
            offset.y,
            tile_size
        );
        Point::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::StaticImageLoader;

    fn loader() -> StaticImageLoader {
        StaticImageLoader::new()
            .with_image("server@cave.png", 100, 100)
            .with_image("server@orc.png", 32, 32)
    }

    fn remote() -> RemoteBoardModel {
        RemoteBoardModel::new("B1", "Cave", "server@cave.png", 50, GridSize::new(2, 2))
            .with_tokens(vec![
                TokenData::new("t1", "Orc", "server@orc.png", 1).placed_at(Location::new(0, 0))
            ])
    }

    fn background() -> LoadedImage {
        LoadedImage::new("server@cave.png", 100, 100)
    }

    #[tokio::test]
    async fn test_create_from_remote() {
        let board = BoardModel::create_from_remote(&remote(), &loader()).await.unwrap();
        assert_eq!(board.id(), "B1");
        assert_eq!(board.size(), GridSize::new(2, 2));
        assert_eq!(board.tokens().len(), 1);
        assert_eq!(board.token_image("server@orc.png").map(|i| i.width), Some(32));
        assert_eq!(board.to_remote(), remote());
    }

    #[tokio::test]
    async fn test_create_from_remote_image_failure() {
        let loader = StaticImageLoader::new().with_image("server@cave.png", 100, 100);
        let err = BoardModel::create_from_remote(&remote(), &loader).await.unwrap_err();
        assert!(matches!(err, BoardError::ImageLoad(e) if e.image == "server@orc.png"));
    }

    #[tokio::test]
    async fn test_create_from_remote_rejects_invalid() {
        let mut invalid = remote();
        invalid.tile_size = 0;
        let err = BoardModel::create_from_remote(&invalid, &loader()).await.unwrap_err();
        assert!(matches!(err, BoardError::Validation(ValidationError::InvalidTileSize(0))));
    }

    #[tokio::test]
    async fn test_create_from_remote_derives_size_from_image() {
        // Stored as 2x2 but the image now spans 3x2 tiles.
        let loader = StaticImageLoader::new()
            .with_image("server@cave.png", 150, 100)
            .with_image("server@orc.png", 32, 32);
        let mut stored = remote();
        stored.fog_of_war.set(Location::new(1, 1), FogState::Full);

        let board = BoardModel::create_from_remote(&stored, &loader).await.unwrap();
        assert_eq!(board.size(), GridSize::new(3, 2));
        assert_eq!(board.fog_of_war().get(Location::new(1, 1)), Some(&FogState::Full));
        assert_eq!(board.fog_of_war().get(Location::new(2, 1)), Some(&FogState::None));
        assert!(board.to_remote().is_valid());
    }

    #[tokio::test]
    async fn test_invalid_offset_is_ignored() {
        let mut stored = remote();
        stored.grid_offset = Point::new(75.0, 0.0);
        let board = BoardModel::create_from_remote(&stored, &loader()).await.unwrap();
        assert_eq!(board.grid_offset(), Point::default());
    }

    #[test]
    fn test_new_board() {
        let board = BoardModel::new_board("Cave", background(), 10).unwrap();
        assert_eq!(board.size(), GridSize::new(10, 10));
        assert!(board.tokens().is_empty());
        assert!(board.to_remote().is_valid());

        let other = BoardModel::new_board("Cave", background(), 10).unwrap();
        assert_ne!(board.id(), other.id());
    }

    #[test]
    fn test_new_board_validation() {
        assert_eq!(
            BoardModel::new_board("", background(), 10).unwrap_err(),
            ValidationError::MissingField("name")
        );
        assert_eq!(
            BoardModel::new_board("Cave", background(), 0).unwrap_err(),
            ValidationError::InvalidTileSize(0)
        );
    }

    #[test]
    fn test_peeked_fog_is_sent_as_full() {
        let mut board = BoardModel::new_board("Cave", background(), 50).unwrap();
        board.set_fog(Location::new(0, 1), FogState::Peeked);
        assert_eq!(board.fog_of_war().get(Location::new(0, 1)), Some(&FogState::Peeked));
        assert_eq!(
            board.to_remote().fog_of_war.get(Location::new(0, 1)),
            Some(&FogState::Full)
        );
    }

    #[test]
    fn test_update_grid_parameters_preserves_cells() {
        let mut board = BoardModel::new_board("Cave", background(), 50).unwrap();
        board.set_fog(Location::new(1, 1), FogState::Full);
        board.set_highlight(Location::new(0, 0), Highlight::Orange);

        board.update_grid_parameters(25, None).unwrap();
        assert_eq!(board.size(), GridSize::new(4, 4));
        assert_eq!(board.fog_of_war().get(Location::new(1, 1)), Some(&FogState::Full));
        assert_eq!(board.fog_of_war().get(Location::new(3, 3)), Some(&FogState::None));
        assert_eq!(board.public_selection().get(Location::new(0, 0)), Some(&Highlight::Orange));

        board
            .update_grid_parameters(50, Some(LoadedImage::new("server@small.png", 50, 50)))
            .unwrap();
        assert_eq!(board.size(), GridSize::new(1, 1));
        assert_eq!(board.background().source, "server@small.png");
        assert!(board.to_remote().is_valid());

        assert!(board.update_grid_parameters(0, None).is_err());
    }

    #[test]
    fn test_grid_offset_adds_partial_tiles() {
        let mut board = BoardModel::new_board("Cave", background(), 50).unwrap();
        board.set_grid_offset(Point::new(10.0, -60.0));
        assert_eq!(board.grid_offset(), Point::new(10.0, 40.0));
        assert_eq!(board.size(), GridSize::new(3, 3));
        assert!(board.to_remote().is_valid());
    }

    #[test]
    fn test_token_mutations() {
        let mut board = BoardModel::new_board("Cave", background(), 50).unwrap();
        let orc = TokenData::new("t1", "Orc", "server@orc.png", 1).placed_at(Location::new(0, 0));
        let image = LoadedImage::new("server@orc.png", 32, 32);

        board.add_token(orc.clone(), image.clone()).unwrap();
        assert_eq!(
            board.add_token(orc, image.clone()),
            Err(ValidationError::DuplicateToken("t1".into()))
        );
        assert_eq!(
            board.add_token(TokenData::new("t2", "Elf", "server@elf.png", 1), image),
            Err(ValidationError::UnplacedToken("t2".into()))
        );

        assert!(board.move_token("t1", Location::new(1, 1)));
        assert!(!board.move_token("nope", Location::new(1, 1)));
        assert_eq!(board.tokens().get("t1").unwrap().location, Some(Location::new(1, 1)));

        assert!(board.remove_token("t1").is_some());
        assert!(board.tokens().is_empty());
    }

    #[test]
    fn test_painting() {
        let mut board = BoardModel::new_board("Cave", background(), 25).unwrap();
        let area = SimpleArea::new(Location::new(2, 2), Location::new(1, 1));
        board.paint_fog(&area, FogState::Full);
        board.paint_highlight(&area, Highlight::Blue);

        let fogged = board.fog_of_war().cells().filter(|(_, f)| f.is_fogged()).count();
        assert_eq!(fogged, 4);
        assert_eq!(board.public_selection().get(Location::new(2, 1)), Some(&Highlight::Blue));
        assert!(!board.set_fog(Location::new(4, 0), FogState::Full));
    }

    #[test]
    fn test_local_selection_is_not_sent() {
        let mut board = BoardModel::new_board("Cave", background(), 50).unwrap();
        let before = board.to_remote();

        assert!(board.toggle_local_selection(Location::new(1, 0)));
        assert!(!board.toggle_local_selection(Location::new(5, 0)));
        assert_eq!(board.local_selection(), vec![Location::new(1, 0)]);
        assert_eq!(board.to_remote(), before);

        board.toggle_local_selection(Location::new(1, 0));
        assert!(board.local_selection().is_empty());
        board.toggle_local_selection(Location::new(0, 0));
        board.clear_local_selection();
        assert!(board.local_selection().is_empty());
    }

    #[test]
    fn test_colliding_tokens() {
        let mut board = BoardModel::new_board("Cave", background(), 10).unwrap();
        let image = LoadedImage::new("server@ogre.png", 64, 64);
        board
            .add_token(
                TokenData::new("ogre", "Ogre", "server@ogre.png", 2).placed_at(Location::new(7, 1)),
                image,
            )
            .unwrap();

        assert_eq!(board.colliding_tokens(Location::new(6, 0), 2).len(), 1);
        assert!(board.colliding_tokens(Location::new(9, 1), 1).is_empty());
        assert!(board.colliding_tokens(Location::new(5, 1), 2).is_empty());
    }
}
