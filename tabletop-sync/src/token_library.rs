//! Client-side copy of the server's token library.
//!
//! The library is fetched at most once per `TokenLibrary`. Tokens placed by
//! local edits are folded in afterwards so pickers see them without another
//! round trip. Edits made before the first fetch are not recorded, since
//! the server already has them by the time it answers.

use tabletop_core::{TokenData, TokenSet};
use tokio::sync::Mutex;

use crate::board_client::BoardClient;
use crate::error::SyncError;

pub struct TokenLibrary {
    client: BoardClient,
    cached: Mutex<Option<Vec<TokenData>>>,
}

impl TokenLibrary {
    pub fn new(client: BoardClient) -> Self {
        Self {
            client,
            cached: Mutex::new(None),
        }
    }

    /// Every token definition known to this client.
    ///
    /// The first call asks the server; concurrent first calls share that
    /// one request. A failed request is not cached.
    pub async fn all_tokens(&self) -> Result<Vec<TokenData>, SyncError> {
        let mut cached = self.cached.lock().await;
        if let Some(tokens) = cached.as_ref() {
            return Ok(tokens.clone());
        }
        let tokens = self.client.request_all_tokens().await?;
        log::debug!("Token library loaded with {} tokens", tokens.len());
        *cached = Some(tokens.clone());
        Ok(tokens)
    }

    /// Fold the definitions of `tokens` into the cached library, replacing
    /// entries with the same id. Does nothing before the first fetch.
    pub async fn update_tokens(&self, tokens: &TokenSet) {
        let mut cached = self.cached.lock().await;
        let Some(library) = cached.as_mut() else {
            return;
        };
        for token in tokens {
            let definition = token.definition();
            match library.iter_mut().find(|known| known.id == definition.id) {
                Some(known) => *known = definition,
                None => library.push(definition),
            }
        }
    }

    pub async fn is_loaded(&self) -> bool {
        self.cached.lock().await.is_some()
    }

    /// Forget the cached library; the next `all_tokens` asks the server again.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
