//! Game state owned by the server: boards, the token library, and which
//! board is live.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tabletop_core::{RemoteBoardDiff, RemoteBoardModel, TokenData};

use super::backend::{Family, MemoryBackend, RecordBackend, StoreError};
use super::cache::StorageCache;
use crate::error::SyncError;

pub const ACTIVE_BOARD_KEY: &str = "active.db";
pub const ALL_BOARDS_KEY: &str = "all_boards.db";

pub struct GameLoader {
    backend: Arc<dyn RecordBackend>,
    boards: StorageCache<RemoteBoardModel>,
    tokens: StorageCache<TokenData>,
    active_board: Option<String>,
    board_ids: Vec<String>,
}

impl GameLoader {
    pub fn open(backend: Arc<dyn RecordBackend>) -> Result<Self, StoreError> {
        let mut loader = Self::empty_with(backend);
        loader.active_board = read_meta(loader.backend.as_ref(), ACTIVE_BOARD_KEY)?;
        loader.board_ids = read_meta(loader.backend.as_ref(), ALL_BOARDS_KEY)?.unwrap_or_default();
        log::info!(
            "Game loaded: {} boards, active board {:?}",
            loader.board_ids.len(),
            loader.active_board
        );
        Ok(loader)
    }

    pub fn in_memory() -> Self {
        Self::empty_with(Arc::new(MemoryBackend::new()))
    }

    fn empty_with(backend: Arc<dyn RecordBackend>) -> Self {
        Self {
            boards: StorageCache::new(backend.clone()),
            tokens: StorageCache::new(backend.clone()),
            backend,
            active_board: None,
            board_ids: Vec::new(),
        }
    }

    pub fn active_board(&self) -> Option<&str> {
        self.active_board.as_deref()
    }

    pub fn set_active_board(&mut self, board_id: &str) -> Result<(), StoreError> {
        write_meta(self.backend.as_ref(), ACTIVE_BOARD_KEY, &board_id)?;
        self.active_board = Some(board_id.to_string());
        log::info!("Active board is now {board_id}");
        Ok(())
    }

    pub fn all_board_ids(&self) -> &[String] {
        &self.board_ids
    }

    /// Store `board`, replacing any previous version, and record its
    /// tokens in the library.
    pub fn save_board(&mut self, board: RemoteBoardModel) -> Result<(), StoreError> {
        board
            .validate()
            .map_err(|e| StoreError::InvalidRecord(format!("board {}: {e}", board.id)))?;
        self.save_tokens(&board)?;
        self.remember_board_id(&board.id)?;
        let id = board.id.clone();
        self.boards.update(&id, board)
    }

    /// Store a board that must not exist yet.
    pub fn create_new_board(&mut self, board: RemoteBoardModel) -> Result<(), StoreError> {
        board
            .validate()
            .map_err(|e| StoreError::InvalidRecord(format!("board {}: {e}", board.id)))?;
        let id = board.id.clone();
        self.boards.add_new(&id, board.clone())?;
        self.save_tokens(&board)?;
        self.remember_board_id(&id)?;
        log::info!("Created board {id}");
        Ok(())
    }

    /// Load a board with its tokens refreshed from the library.
    ///
    /// Library name, image, size and speed replace the board's copy; the
    /// placement is kept.
    pub fn retrieve_board(&mut self, board_id: &str) -> Result<RemoteBoardModel, StoreError> {
        let mut board = self.boards.get(board_id)?;

        let placed_tokens = board.tokens.clone();
        let mut changed = false;
        for token in placed_tokens.iter() {
            let definition = match self.tokens.get(&token.id) {
                Ok(definition) => definition,
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => {
                    log::warn!("Skipping library lookup for token {}: {e}", token.id);
                    continue;
                }
            };
            if token.same_definition(&definition) {
                continue;
            }
            if let Some(placed) = board.tokens.get_mut(&token.id) {
                placed.name = definition.name;
                placed.image_source = definition.image_source;
                placed.size = definition.size;
                placed.speed = definition.speed;
                changed = true;
            }
        }

        if changed {
            log::debug!("Board {board_id}: refreshed tokens from library");
            self.boards.update(board_id, board.clone())?;
        }
        Ok(board)
    }

    /// Merge `diff` into the stored board and save the result.
    pub fn update_board(&mut self, diff: &RemoteBoardDiff) -> Result<RemoteBoardModel, SyncError> {
        let board = self.retrieve_board(&diff.id)?;
        let merged = board.merged_with(diff)?;
        self.save_board(merged.clone())?;
        Ok(merged)
    }

    /// The whole token library. Records that cannot be loaded are skipped.
    pub fn get_all_tokens(&mut self) -> Result<Vec<TokenData>, StoreError> {
        let mut tokens = Vec::new();
        for id in self.tokens.keys()? {
            match self.tokens.get(&id) {
                Ok(token) => tokens.push(token),
                Err(e) => log::warn!("Skipping library token {id}: {e}"),
            }
        }
        Ok(tokens)
    }

    pub fn dirty_count(&self) -> usize {
        self.boards.dirty_count() + self.tokens.dirty_count()
    }

    /// Persist every dirty record. Returns how many were written.
    pub fn flush(&mut self) -> Result<usize, StoreError> {
        let boards = self.boards.flush_dirty()?;
        let tokens = self.tokens.flush_dirty()?;
        self.backend.flush()?;
        if boards + tokens > 0 {
            log::info!("Flushed {boards} boards and {tokens} tokens");
        }
        Ok(boards + tokens)
    }

    fn save_tokens(&mut self, board: &RemoteBoardModel) -> Result<(), StoreError> {
        for token in board.tokens.iter() {
            self.tokens.update(&token.id, token.definition())?;
        }
        Ok(())
    }

    fn remember_board_id(&mut self, board_id: &str) -> Result<(), StoreError> {
        if self.board_ids.iter().any(|id| id == board_id) {
            return Ok(());
        }
        let mut ids = self.board_ids.clone();
        ids.push(board_id.to_string());
        write_meta(self.backend.as_ref(), ALL_BOARDS_KEY, &ids)?;
        self.board_ids = ids;
        Ok(())
    }
}

fn read_meta<T: DeserializeOwned>(
    backend: &dyn RecordBackend,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match backend.get(Family::Meta, key)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::DeserializationError(format!("{key}: {e}"))),
        None => Ok(None),
    }
}

fn write_meta<T: Serialize + ?Sized>(
    backend: &dyn RecordBackend,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let bytes =
        serde_json::to_vec(value).map_err(|e| StoreError::SerializationError(e.to_string()))?;
    backend.put(Family::Meta, key, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabletop_core::{GridSize, Location};

    fn board(id: &str) -> RemoteBoardModel {
        RemoteBoardModel::new(id, "Crypt", "server@crypt.png", 50, GridSize::new(4, 4))
    }

    fn goblin() -> TokenData {
        TokenData::new("t1", "Goblin", "server@goblin.png", 1).placed_at(Location::new(1, 1))
    }

    fn loader() -> (Arc<MemoryBackend>, GameLoader) {
        let backend = Arc::new(MemoryBackend::new());
        let loader = GameLoader::open(backend.clone()).unwrap();
        (backend, loader)
    }

    #[test]
    fn test_empty_game() {
        let (_, loader) = loader();
        assert_eq!(loader.active_board(), None);
        assert!(loader.all_board_ids().is_empty());
    }

    #[test]
    fn test_create_and_retrieve() {
        let (_, mut loader) = loader();
        loader
            .create_new_board(board("b1").with_tokens(vec![goblin()]))
            .unwrap();

        assert_eq!(loader.all_board_ids(), ["b1".to_string()]);
        assert_eq!(
            loader.retrieve_board("b1").unwrap(),
            board("b1").with_tokens(vec![goblin()])
        );
        assert_eq!(loader.get_all_tokens().unwrap(), vec![goblin().definition()]);
    }

    #[test]
    fn test_create_duplicate_fails() {
        let (_, mut loader) = loader();
        loader.create_new_board(board("b1")).unwrap();
        assert!(matches!(
            loader.create_new_board(board("b1")),
            Err(StoreError::AlreadyExists(_))
        ));
        assert_eq!(loader.all_board_ids().len(), 1);
    }

    #[test]
    fn test_save_rejects_invalid_board() {
        let (_, mut loader) = loader();
        let mut broken = board("b1");
        broken.tile_size = 0;
        assert!(matches!(
            loader.save_board(broken),
            Err(StoreError::InvalidRecord(_))
        ));
        assert!(loader.all_board_ids().is_empty());
    }

    #[test]
    fn test_retrieve_overlays_library() {
        let (_, mut loader) = loader();
        loader
            .create_new_board(board("b1").with_tokens(vec![goblin()]))
            .unwrap();

        // Another board redefines the same token.
        let chief = TokenData::new("t1", "Goblin Chief", "server@chief.png", 2)
            .with_speed(4)
            .placed_at(Location::new(0, 0));
        loader
            .create_new_board(board("b2").with_tokens(vec![chief]))
            .unwrap();

        let refreshed = loader.retrieve_board("b1").unwrap();
        let token = refreshed.tokens.get("t1").unwrap();
        assert_eq!(token.name, "Goblin Chief");
        assert_eq!(token.image_source, "server@chief.png");
        assert_eq!(token.size, 2);
        assert_eq!(token.speed, 4);
        assert_eq!(token.location, Some(Location::new(1, 1)));
    }

    #[test]
    fn test_update_board_merges() {
        let (_, mut loader) = loader();
        loader.create_new_board(board("b1")).unwrap();

        let mut diff = RemoteBoardDiff::new("b1");
        diff.tokens_added.push(goblin());
        let merged = loader.update_board(&diff).unwrap();

        assert!(merged.tokens.contains("t1"));
        assert!(loader.retrieve_board("b1").unwrap().tokens.contains("t1"));
        assert_eq!(loader.get_all_tokens().unwrap().len(), 1);
    }

    #[test]
    fn test_update_unknown_board() {
        let (_, mut loader) = loader();
        let diff = RemoteBoardDiff::new("ghost");
        assert!(matches!(
            loader.update_board(&diff),
            Err(SyncError::Store(StoreError::NotFound(_)))
        ));
    }

    #[test]
    fn test_state_survives_reopen() {
        let (backend, mut loader) = loader();
        loader.create_new_board(board("b1")).unwrap();
        loader.set_active_board("b1").unwrap();
        assert_eq!(loader.flush().unwrap(), 1);
        assert_eq!(loader.dirty_count(), 0);
        drop(loader);

        let mut reopened = GameLoader::open(backend).unwrap();
        assert_eq!(reopened.active_board(), Some("b1"));
        assert_eq!(reopened.all_board_ids(), ["b1".to_string()]);
        assert_eq!(reopened.retrieve_board("b1").unwrap(), board("b1"));
    }

    #[test]
    fn test_in_memory_loader() {
        let mut loader = GameLoader::in_memory();
        loader.save_board(board("b1")).unwrap();
        assert_eq!(loader.all_board_ids().len(), 1);
    }
}
