//! End-to-end tests over real WebSocket connections.
//!
//! Each test starts a server on a free port and connects `WsTransport`
//! clients to it.

use std::sync::{Arc, Mutex};

use tabletop_core::{
    BoardModel, GridSize, LoadedImage, Location, RemoteBoardModel, StaticImageLoader, TokenData,
};
use tabletop_sync::{
    BoardClient, BoardEvent, ClientConfig, ConnectionState, GameLoader, RemoteBoard, ServerConfig,
    SyncError, SyncMessage, SyncServer, Transport, WsTransport,
};
use tokio::time::{timeout, Duration};

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn test_config(port: u16) -> ServerConfig {
    ServerConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        max_peers_per_room: 10,
        broadcast_capacity: 64,
        ..ServerConfig::default()
    }
}

async fn start_server(config: ServerConfig, game: GameLoader) -> String {
    let url = format!("ws://{}{}", config.bind_addr, config.namespace);
    let server = SyncServer::with_loader(config, game);
    tokio::spawn(async move {
        server.run().await.unwrap();
    });
    // Give server time to bind
    tokio::time::sleep(Duration::from_millis(50)).await;
    url
}

async fn start_test_server() -> String {
    start_server(test_config(free_port().await), GameLoader::in_memory()).await
}

async fn connect(url: &str) -> (Arc<WsTransport>, BoardClient) {
    let transport = Arc::new(WsTransport::with_url(url));
    transport.connect().await.unwrap();
    let client = BoardClient::with_config(
        transport.clone(),
        ClientConfig {
            request_timeout: Duration::from_secs(2),
        },
    );
    (transport, client)
}

/// Wait for the server to register fresh connections.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn crypt(id: &str) -> RemoteBoardModel {
    RemoteBoardModel::new(id, "Crypt", "server@crypt.png", 50, GridSize::new(2, 2))
}

#[tokio::test]
async fn test_client_connects() {
    let url = start_test_server().await;
    let (transport, _) = connect(&url).await;
    assert_eq!(transport.connection_state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn test_unknown_namespace_rejected() {
    let port = free_port().await;
    start_server(test_config(port), GameLoader::in_memory()).await;

    let result = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}/chat")).await;
    assert!(result.is_err(), "Handshake on another path should fail");
}

#[tokio::test]
async fn test_create_get_and_list() {
    let url = start_test_server().await;
    let (_t, client) = connect(&url).await;

    client.create_board(crypt("b1")).await.unwrap();
    assert_eq!(client.request_board("b1").await.unwrap(), crypt("b1"));
    assert_eq!(client.request_board_options().await.unwrap(), vec!["b1".to_string()]);
}

#[tokio::test]
async fn test_get_missing_board_errors() {
    let url = start_test_server().await;
    let (_t, client) = connect(&url).await;

    let result = client.request_board("ghost").await;
    assert!(matches!(result, Err(SyncError::Server(_))), "got {result:?}");
}

#[tokio::test]
async fn test_active_board_round_trip() {
    let url = start_test_server().await;
    let (_t, client) = connect(&url).await;

    assert!(matches!(
        client.request_active_board_id().await,
        Err(SyncError::Server(_))
    ));

    client.create_board(crypt("b1")).await.unwrap();
    client.set_active_board("b1").await.unwrap();
    assert_eq!(client.request_active_board_id().await.unwrap(), "b1");
}

#[tokio::test]
async fn test_token_library() {
    let url = start_test_server().await;
    let (_t, client) = connect(&url).await;

    let goblin = TokenData::new("t1", "Goblin", "server@goblin.png", 1).placed_at(Location::new(1, 0));
    client
        .create_board(crypt("b1").with_tokens(vec![goblin.clone()]))
        .await
        .unwrap();

    assert_eq!(client.request_all_tokens().await.unwrap(), vec![goblin.definition()]);
}

#[tokio::test]
async fn test_update_reaches_other_clients_only() {
    let url = start_test_server().await;
    let (_ta, alice) = connect(&url).await;
    let (_tb, bob) = connect(&url).await;
    alice.create_board(crypt("b1")).await.unwrap();

    let mut alice_updates = alice.remote_updates().await;
    let mut bob_updates = bob.remote_updates().await;
    settle().await;

    let mut diff = tabletop_core::RemoteBoardDiff::new("b1");
    diff.name = Some("Tomb".into());
    alice.update_board(diff.clone()).await.unwrap();

    let received = timeout(Duration::from_secs(2), bob_updates.next())
        .await
        .expect("bob should receive the update")
        .unwrap()
        .unwrap();
    assert_eq!(received, diff);

    let echoed = timeout(Duration::from_millis(200), alice_updates.next()).await;
    assert!(echoed.is_err(), "sender must not receive its own update");

    // The server merged it into the stored board.
    settle().await;
    assert_eq!(bob.request_board("b1").await.unwrap().name, "Tomb");
}

#[tokio::test]
async fn test_invalid_update_not_relayed() {
    let url = start_test_server().await;
    let (alice_transport, _alice) = connect(&url).await;
    let (_tb, bob) = connect(&url).await;
    let mut bob_updates = bob.remote_updates().await;
    settle().await;

    let mut bad = tabletop_core::RemoteBoardDiff::new("b1");
    bad.tile_size = Some(0);
    alice_transport.emit(BoardEvent::Update(bad)).await.unwrap();

    let relayed = timeout(Duration::from_millis(200), bob_updates.next()).await;
    assert!(relayed.is_err());
}

/// Client one loads a 100×100 board with 50px tiles and adds a token;
/// client two ends up with exactly that token.
#[tokio::test]
async fn test_token_added_on_one_client_appears_on_another() {
    let url = start_test_server().await;
    let loader = StaticImageLoader::new()
        .with_image("server@bg.png", 100, 100)
        .with_image("server@goblin.png", 50, 50);

    let (_ta, alice) = connect(&url).await;
    let (_tb, bob) = connect(&url).await;
    alice
        .create_board(RemoteBoardModel::new("B1", "Cave", "server@bg.png", 50, GridSize::new(2, 2)))
        .await
        .unwrap();

    let (alice_remote, _) = alice.join_board("B1").await.unwrap();
    let mut alice_board = BoardModel::create_from_remote(&alice_remote, &loader).await.unwrap();
    assert_eq!(alice_board.size(), GridSize::new(2, 2));

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let mut alice_sync = RemoteBoard::new(alice_board.to_remote(), alice.clone(), |_, _| {}).await;
    let (bob_remote, _) = bob.join_board("B1").await.unwrap();
    let mut bob_sync = RemoteBoard::new(bob_remote, bob.clone(), move |diff, _| {
        sink.lock().unwrap().push(diff.clone());
    })
    .await;
    settle().await;

    let t1 = TokenData::new("t1", "Goblin", "server@goblin.png", 1).placed_at(Location::new(0, 0));
    alice_board
        .add_token(t1.clone(), LoadedImage::new("server@goblin.png", 50, 50))
        .unwrap();
    let sent = alice_sync
        .on_local_update(alice_board.to_remote())
        .await
        .unwrap()
        .expect("adding a token produces a diff");
    assert_eq!(sent.tokens_added, vec![t1.clone()]);
    assert!(sent.tokens_removed.is_empty());

    timeout(Duration::from_secs(2), bob_sync.next_remote_update())
        .await
        .expect("bob should receive the diff")
        .unwrap()
        .unwrap();

    let tokens: Vec<_> = bob_sync.remote_model().tokens.iter().cloned().collect();
    assert_eq!(tokens, vec![t1]);
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_offline_events_replayed_on_connect() {
    let url = start_test_server().await;
    let transport = Arc::new(WsTransport::with_url(url.as_str()));
    let client = BoardClient::new(transport.clone());

    // Queued while disconnected.
    client.create_board(crypt("b1")).await.unwrap();
    assert_eq!(transport.offline_queue_len().await, 1);

    transport.connect().await.unwrap();
    assert_eq!(transport.offline_queue_len().await, 0);
    assert_eq!(client.request_board("b1").await.unwrap(), crypt("b1"));
}

#[tokio::test]
async fn test_room_capacity_enforced() {
    let port = free_port().await;
    let config = ServerConfig {
        max_peers_per_room: 1,
        ..test_config(port)
    };
    let url = start_server(config, GameLoader::in_memory()).await;

    let (_first, client) = connect(&url).await;
    settle().await;
    let (second, _) = connect(&url).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(second.connection_state().await, ConnectionState::Disconnected);

    // The first connection is unaffected.
    assert!(client.request_board_options().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_raw_frames_from_server_are_tagged() {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    let url = start_test_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let request = SyncMessage::new(uuid::Uuid::new_v4(), 1, BoardEvent::GetAllRequest);
    ws.send(Message::Binary(request.encode().unwrap().into()))
        .await
        .unwrap();

    let reply = timeout(Duration::from_secs(2), ws.next()).await.unwrap().unwrap().unwrap();
    let Message::Binary(data) = reply else {
        panic!("expected a binary frame");
    };
    let msg = SyncMessage::decode(&data).unwrap();
    assert!(msg.peer_id.is_nil());
    assert_eq!(msg.event, BoardEvent::GetAllResponse(Vec::new()));
}
