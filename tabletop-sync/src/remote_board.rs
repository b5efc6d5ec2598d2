//! Per-session synchronization controller.
//!
//! ```text
//!   local edit ──► on_local_update ──► diff vs held model ──► emit
//!                                          │
//!                                          ▼ (optimistic)
//!                                    held RemoteBoardModel
//!                                          ▲
//!   transport ──► on_remote_update ──► validate ──► merge ──► on_update
//! ```
//!
//! The held model is only ever replaced by a fresh value from the diff
//! and merge functions; nothing else mutates it.

use std::sync::Arc;

use tabletop_core::{RemoteBoardDiff, RemoteBoardModel};

use crate::board_client::{BoardClient, BoardUpdates};
use crate::error::SyncError;
use crate::token_library::TokenLibrary;

/// Called after each applied remote diff with the diff and the new model.
pub type UpdateCallback = Box<dyn FnMut(&RemoteBoardDiff, &RemoteBoardModel) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    Synced,
}

pub struct RemoteBoard {
    remote_model: RemoteBoardModel,
    client: BoardClient,
    updates: Option<BoardUpdates>,
    on_update: UpdateCallback,
    state: SyncState,
    library: Option<Arc<TokenLibrary>>,
}

impl RemoteBoard {
    /// Take ownership of `model` and subscribe to incoming diffs.
    pub async fn new(
        model: RemoteBoardModel,
        client: BoardClient,
        on_update: impl FnMut(&RemoteBoardDiff, &RemoteBoardModel) + Send + 'static,
    ) -> Self {
        let mut board = Self {
            remote_model: model,
            client,
            updates: None,
            on_update: Box::new(on_update),
            state: SyncState::Uninitialized,
            library: None,
        };
        board.updates = Some(board.client.remote_updates().await);
        board.state = SyncState::Synced;
        log::debug!("Remote board {} synced", board.remote_model.id);
        board
    }

    /// Keep `library` up to date with the tokens of every local edit.
    pub fn with_token_library(mut self, library: Arc<TokenLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    /// Diff `model` against the held model and send the result.
    ///
    /// The held model and the token library are updated before anything is
    /// sent. A failed send is logged and the local state is kept.
    pub async fn on_local_update(
        &mut self,
        model: RemoteBoardModel,
    ) -> Result<Option<RemoteBoardDiff>, SyncError> {
        let Some(diff) = RemoteBoardDiff::compute_between(&model, &self.remote_model)? else {
            log::trace!("Board {}: local update produced no diff", model.id);
            return Ok(None);
        };

        if let Some(library) = &self.library {
            library.update_tokens(&model.tokens).await;
        }
        self.remote_model = model;
        if let Err(e) = self.client.update_board(diff.clone()).await {
            log::warn!("Board {}: failed to send update: {e}", diff.id);
        }
        Ok(Some(diff))
    }

    /// Validate and merge `diff`, then notify the callback.
    ///
    /// A diff for another board leaves the held model untouched.
    pub fn on_remote_update(&mut self, diff: RemoteBoardDiff) -> Result<(), SyncError> {
        diff.validate().map_err(SyncError::InvalidRemoteData)?;

        let merged = match self.remote_model.merged_with(&diff) {
            Ok(merged) => merged,
            Err(e) => {
                log::error!("Refusing to merge: {e}");
                return Err(e.into());
            }
        };
        self.remote_model = merged;
        (self.on_update)(&diff, &self.remote_model);
        Ok(())
    }

    /// Wait for the next delivered diff and apply it.
    ///
    /// Returns `None` when the transport has shut down.
    pub async fn next_remote_update(&mut self) -> Option<Result<(), SyncError>> {
        let updates = self.updates.as_mut()?;
        let delivered = updates.next().await?;
        Some(delivered.and_then(|diff| self.on_remote_update(diff)))
    }

    pub fn remote_model(&self) -> &RemoteBoardModel {
        &self.remote_model
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn client(&self) -> &BoardClient {
        &self.client
    }

    pub fn token_library(&self) -> Option<&Arc<TokenLibrary>> {
        self.library.as_ref()
    }
}
