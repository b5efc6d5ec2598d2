//! Request/response helpers over a [`Transport`].
//!
//! `BoardClient` owns no board state. It turns the named-event channel
//! into typed calls and validates everything the other side sends back.

use std::sync::Arc;
use std::time::Duration;

use tabletop_core::{IdMismatchError, RemoteBoardDiff, RemoteBoardModel, TokenData};
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::protocol::{self, BoardEvent};
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long a request waits for its response
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
pub struct BoardClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl BoardClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a diff. Fire-and-forget.
    pub async fn update_board(&self, diff: RemoteBoardDiff) -> Result<(), SyncError> {
        log::debug!("Sending update for board {}", diff.id);
        self.transport.emit(BoardEvent::Update(diff)).await?;
        Ok(())
    }

    pub async fn create_board(&self, model: RemoteBoardModel) -> Result<(), SyncError> {
        log::info!("Requesting creation of board {}", model.id);
        self.transport.emit(BoardEvent::CreateRequest(model)).await?;
        Ok(())
    }

    /// Every diff delivered from now on, for any board.
    pub async fn remote_updates(&self) -> BoardUpdates {
        BoardUpdates {
            rx: self.transport.on(protocol::BOARD_UPDATE).await,
            board_id: None,
        }
    }

    /// Subscribe to diffs for `board_id`, then fetch its snapshot.
    ///
    /// The subscription is made before the request so no diff sent after
    /// the snapshot is missed.
    pub async fn join_board(
        &self,
        board_id: &str,
    ) -> Result<(RemoteBoardModel, BoardUpdates), SyncError> {
        let updates = BoardUpdates {
            rx: self.transport.on(protocol::BOARD_UPDATE).await,
            board_id: Some(board_id.to_string()),
        };
        let model = self.request_board(board_id).await?;
        Ok((model, updates))
    }

    /// Fetch a full snapshot. A snapshot that fails validation is repaired
    /// with `fill_defaults` and checked again before being rejected.
    pub async fn request_board(&self, board_id: &str) -> Result<RemoteBoardModel, SyncError> {
        let mut responses = self.transport.on(protocol::BOARD_GET_RESPONSE).await;
        let mut errors = self.transport.on(protocol::BOARD_GET_ERROR).await;
        self.transport
            .emit(BoardEvent::GetRequest(board_id.to_string()))
            .await?;

        let wait = async {
            loop {
                tokio::select! {
                    Some(event) = responses.recv() => match event {
                        BoardEvent::GetResponse(model) if model.id == board_id => {
                            return Ok(model);
                        }
                        BoardEvent::GetResponse(model) => {
                            log::trace!("Ignoring snapshot of board {}", model.id);
                        }
                        _ => {}
                    },
                    Some(event) = errors.recv() => {
                        if let BoardEvent::GetError(message) = event {
                            return Err(SyncError::Server(message));
                        }
                    },
                    else => return Err(protocol::ProtocolError::ConnectionClosed.into()),
                }
            }
        };
        let mut model = self.within_timeout(wait).await?;

        if let Err(e) = model.validate() {
            log::warn!("Board {board_id} failed validation ({e}), filling defaults");
            model.fill_defaults();
            model.validate().map_err(SyncError::InvalidRemoteData)?;
        }
        Ok(model)
    }

    /// Ids of every stored board.
    pub async fn request_board_options(&self) -> Result<Vec<String>, SyncError> {
        let mut rx = self.transport.on(protocol::BOARD_GET_ALL_RESPONSE).await;
        self.transport.emit(BoardEvent::GetAllRequest).await?;
        self.wait_for(&mut rx, |event| match event {
            BoardEvent::GetAllResponse(ids) => Some(ids),
            _ => None,
        })
        .await
    }

    /// The token library. Invalid tokens are repaired when possible and
    /// dropped otherwise.
    pub async fn request_all_tokens(&self) -> Result<Vec<TokenData>, SyncError> {
        let mut rx = self.transport.on(protocol::TOKENS_GET_ALL_RESPONSE).await;
        self.transport.emit(BoardEvent::TokensGetAllRequest).await?;
        let tokens = self
            .wait_for(&mut rx, |event| match event {
                BoardEvent::TokensGetAllResponse(tokens) => Some(tokens),
                _ => None,
            })
            .await?;

        Ok(tokens
            .into_iter()
            .filter_map(|mut token| {
                if token.validate().is_ok() {
                    return Some(token);
                }
                token.fill_defaults();
                match token.validate() {
                    Ok(()) => Some(token),
                    Err(e) => {
                        log::warn!("Dropping invalid library token {:?}: {e}", token.id);
                        None
                    }
                }
            })
            .collect())
    }

    /// The id of the board marked live. No active board is a server error.
    pub async fn request_active_board_id(&self) -> Result<String, SyncError> {
        let mut rx = self.transport.on(protocol::BOARD_GET_ACTIVE_RESPONSE).await;
        self.transport.emit(BoardEvent::GetActiveRequest).await?;
        let active = self
            .wait_for(&mut rx, |event| match event {
                BoardEvent::GetActiveResponse(active) => Some(active),
                _ => None,
            })
            .await?;
        active.ok_or_else(|| SyncError::Server("no active board".to_string()))
    }

    pub async fn set_active_board(&self, board_id: &str) -> Result<(), SyncError> {
        self.transport
            .emit(BoardEvent::SetActive(board_id.to_string()))
            .await?;
        Ok(())
    }

    async fn wait_for<T>(
        &self,
        rx: &mut mpsc::Receiver<BoardEvent>,
        mut accept: impl FnMut(BoardEvent) -> Option<T>,
    ) -> Result<T, SyncError> {
        self.within_timeout(async {
            while let Some(event) = rx.recv().await {
                if let Some(value) = accept(event) {
                    return Ok(value);
                }
            }
            Err(protocol::ProtocolError::ConnectionClosed.into())
        })
        .await
    }

    async fn within_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, SyncError>>,
    ) -> Result<T, SyncError> {
        tokio::time::timeout(self.config.request_timeout, fut)
            .await
            .map_err(|_| SyncError::Timeout(self.config.request_timeout))?
    }
}

/// A stream of validated diffs, optionally restricted to one board.
pub struct BoardUpdates {
    rx: mpsc::Receiver<BoardEvent>,
    board_id: Option<String>,
}

impl BoardUpdates {
    /// Wait for the next diff. Returns `None` once the transport is gone.
    ///
    /// On a stream restricted to one board, a diff for any other board is
    /// reported as an id mismatch and not returned.
    pub async fn next(&mut self) -> Option<Result<RemoteBoardDiff, SyncError>> {
        loop {
            let BoardEvent::Update(diff) = self.rx.recv().await? else {
                continue;
            };
            if let Some(board_id) = &self.board_id {
                if &diff.id != board_id {
                    log::warn!("Received update for board {} while joined to {}", diff.id, board_id);
                    return Some(Err(SyncError::IdMismatch(IdMismatchError {
                        expected: board_id.clone(),
                        actual: diff.id,
                    })));
                }
            }
            return Some(match diff.validate() {
                Ok(()) => Ok(diff),
                Err(e) => Err(SyncError::InvalidRemoteData(e)),
            });
        }
    }

    pub fn board_id(&self) -> Option<&str> {
        self.board_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalTransport;
    use tabletop_core::{GridSize, Location};

    fn board(id: &str) -> RemoteBoardModel {
        RemoteBoardModel::new(id, "Crypt", "server@crypt.png", 50, GridSize::new(2, 2))
    }

    /// A client on one end of a local pair, and the raw other end.
    fn connected() -> (BoardClient, Arc<LocalTransport>) {
        let (client_side, server_side) = LocalTransport::pair();
        let client = BoardClient::with_config(
            Arc::new(client_side),
            ClientConfig {
                request_timeout: Duration::from_millis(200),
            },
        );
        (client, Arc::new(server_side))
    }

    /// Answer the first request named `request` with `reply`.
    async fn answer_once(server: Arc<LocalTransport>, request: &'static str, reply: BoardEvent) {
        let mut rx = server.on(request).await;
        tokio::spawn(async move {
            if rx.recv().await.is_some() {
                server.emit(reply).await.unwrap();
            }
        });
    }

    #[tokio::test]
    async fn test_request_board() {
        let (client, server) = connected();
        answer_once(server, protocol::BOARD_GET_REQUEST, BoardEvent::GetResponse(board("B1"))).await;

        let model = client.request_board("B1").await.unwrap();
        assert_eq!(model, board("B1"));
    }

    #[tokio::test]
    async fn test_request_board_repairs_grid_shape() {
        let (client, server) = connected();
        let mut damaged = board("B1");
        damaged.fog_of_war = tabletop_core::Grid::new(1, 1, tabletop_core::FogState::None);
        answer_once(server, protocol::BOARD_GET_REQUEST, BoardEvent::GetResponse(damaged)).await;

        let model = client.request_board("B1").await.unwrap();
        assert!(model.fog_of_war.has_shape(2, 2));
    }

    #[tokio::test]
    async fn test_request_board_rejects_unrepairable() {
        let (client, server) = connected();
        let mut broken = board("B1");
        broken.tile_size = 0;
        answer_once(server, protocol::BOARD_GET_REQUEST, BoardEvent::GetResponse(broken)).await;

        let result = client.request_board("B1").await;
        assert!(matches!(result, Err(SyncError::InvalidRemoteData(_))));
    }

    #[tokio::test]
    async fn test_request_board_error() {
        let (client, server) = connected();
        answer_once(
            server,
            protocol::BOARD_GET_REQUEST,
            BoardEvent::GetError("no such board".into()),
        )
        .await;

        match client.request_board("missing").await {
            Err(SyncError::Server(message)) => assert_eq!(message, "no such board"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let (client, _server) = connected();
        let result = client.request_board_options().await;
        assert!(matches!(result, Err(SyncError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_request_all_tokens_repairs_and_drops() {
        let (client, server) = connected();
        let good = TokenData::new("t1", "Goblin", "server@goblin.png", 1);
        let mut repairable = TokenData::new("t2", "Ogre", "server@ogre.png", 2);
        repairable.size = 0;
        let broken = TokenData::new("", "Nobody", "server@x.png", 1);
        answer_once(
            server,
            protocol::TOKENS_GET_ALL_REQUEST,
            BoardEvent::TokensGetAllResponse(vec![good.clone(), repairable, broken]),
        )
        .await;

        let tokens = client.request_all_tokens().await.unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0], good);
        assert_eq!(tokens[1].size, 1);
    }

    #[tokio::test]
    async fn test_active_board() {
        let (client, server) = connected();
        answer_once(
            server.clone(),
            protocol::BOARD_GET_ACTIVE_REQUEST,
            BoardEvent::GetActiveResponse(Some("B1".into())),
        )
        .await;
        assert_eq!(client.request_active_board_id().await.unwrap(), "B1");

        answer_once(
            server,
            protocol::BOARD_GET_ACTIVE_REQUEST,
            BoardEvent::GetActiveResponse(None),
        )
        .await;
        assert!(matches!(
            client.request_active_board_id().await,
            Err(SyncError::Server(_))
        ));
    }

    #[tokio::test]
    async fn test_join_board_flags_other_boards() {
        let (client, server) = connected();
        answer_once(
            server.clone(),
            protocol::BOARD_GET_REQUEST,
            BoardEvent::GetResponse(board("B1")),
        )
        .await;

        let (model, mut updates) = client.join_board("B1").await.unwrap();
        assert_eq!(model.id, "B1");
        assert_eq!(updates.board_id(), Some("B1"));

        server
            .emit(BoardEvent::Update(RemoteBoardDiff {
                name: Some("Other".into()),
                ..RemoteBoardDiff::new("B2")
            }))
            .await
            .unwrap();
        let mut moved = RemoteBoardDiff::new("B1");
        moved.tokens_moved.push(tabletop_core::TokenMove {
            id: "t1".into(),
            new_location: Location::new(1, 1),
        });
        server.emit(BoardEvent::Update(moved.clone())).await.unwrap();

        match updates.next().await {
            Some(Err(SyncError::IdMismatch(e))) => {
                assert_eq!(e.expected, "B1");
                assert_eq!(e.actual, "B2");
            }
            other => panic!("expected an id mismatch, got {other:?}"),
        }
        assert_eq!(updates.next().await.unwrap().unwrap(), moved);
    }

    #[tokio::test]
    async fn test_invalid_update_is_surfaced() {
        let (client, server) = connected();
        let mut updates = client.remote_updates().await;

        let mut bad = RemoteBoardDiff::new("B1");
        bad.tile_size = Some(0);
        server.emit(BoardEvent::Update(bad)).await.unwrap();

        assert!(matches!(
            updates.next().await,
            Some(Err(SyncError::InvalidRemoteData(_)))
        ));
    }

    #[tokio::test]
    async fn test_fire_and_forget_events() {
        let (client, server) = connected();
        let mut creates = server.on(protocol::BOARD_CREATE_REQUEST).await;
        let mut actives = server.on(protocol::BOARD_SET_ACTIVE).await;

        client.create_board(board("B9")).await.unwrap();
        client.set_active_board("B9").await.unwrap();

        assert_eq!(creates.recv().await, Some(BoardEvent::CreateRequest(board("B9"))));
        assert_eq!(actives.recv().await, Some(BoardEvent::SetActive("B9".into())));
    }
}
