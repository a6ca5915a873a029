//! End-to-end tests against a real WebSocket server on localhost.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use fuzzboard_client::state::TaskStore;
use fuzzboard_client::{
    ClientConfig, ConnectionState, HeartbeatConfig, RealtimeClient, ReconnectConfig,
};
use fuzzboard_protocol::{Envelope, TaskId, TaskStatus};

const DEADLINE: Duration = Duration::from_secs(5);

fn config(addr: std::net::SocketAddr) -> ClientConfig {
    ClientConfig {
        ws_url: format!("ws://{addr}/ws"),
        reconnect: ReconnectConfig {
            max_attempts: 3,
            delay: Duration::from_millis(50),
        },
        heartbeat: HeartbeatConfig {
            interval: None,
            ..HeartbeatConfig::default()
        },
        ..ClientConfig::default()
    }
}

async fn next_envelope(ws: &mut WebSocketStream<TcpStream>) -> Envelope {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Envelope::decode(&text).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

async fn push(ws: &mut WebSocketStream<TcpStream>, event: &str, data: serde_json::Value) {
    let text = Envelope::new(event, data).encode().unwrap();
    ws.send(Message::text(text)).await.unwrap();
}

#[tokio::test]
async fn test_updates_flow_and_going_away_triggers_replay() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let client = RealtimeClient::websocket(&config(listener.local_addr().unwrap()));
    let store = TaskStore::new();
    store.attach(client.bus());

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let subscribe = next_envelope(&mut ws).await;
        push(
            &mut ws,
            "task_update",
            json!({"task_id": 5, "task_name": "libxml2", "status": "running"}),
        )
        .await;
        ws.close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "rotating".into(),
        }))
        .await
        .unwrap();

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let replayed = next_envelope(&mut ws).await;
        (subscribe, replayed, ws)
    });

    let handle = tokio::time::timeout(DEADLINE, client.connect())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handle.epoch(), 1);
    client.subscribe_task(TaskId::new(5));

    let mut tasks = store.watch();
    tokio::time::timeout(
        DEADLINE,
        tasks.wait_for(|state| !state.tasks.is_empty()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(
        store.get(TaskId::new(5)).unwrap().status(),
        Some(TaskStatus::Running)
    );

    let (subscribe, replayed, _ws) = tokio::time::timeout(DEADLINE, server)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscribe.event, "subscribe_task");
    assert_eq!(subscribe.data, json!({"task_id": 5}));
    assert_eq!(replayed, subscribe);

    let mut observer = client.observer();
    tokio::time::timeout(DEADLINE, observer.wait_for(ConnectionState::Connected))
        .await
        .unwrap();
    assert!(!handle.is_current());

    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_ping_round_trip_over_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let client = RealtimeClient::websocket(&config(listener.local_addr().unwrap()));

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let ping = next_envelope(&mut ws).await;
        assert_eq!(ping.event, "ping");
        push(&mut ws, "pong", json!({"timestamp": "2026-10-19T09:30:00"})).await;
        ws
    });

    tokio::time::timeout(DEADLINE, client.connect())
        .await
        .unwrap()
        .unwrap();
    let pong = tokio::time::timeout(DEADLINE, client.ping()).await.unwrap();

    assert_eq!(pong, Some(json!({"timestamp": "2026-10-19T09:30:00"})));
    assert!(client.last_round_trip().is_some());
    let _ws = server.await.unwrap();
    client.disconnect();
}

#[tokio::test]
async fn test_unreachable_server_exhausts_retries() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let client = RealtimeClient::websocket(&config(addr));

    let result = tokio::time::timeout(DEADLINE, client.connect()).await.unwrap();

    assert!(matches!(
        result,
        Err(fuzzboard_client::ClientError::ReconnectExhausted { attempts: 3 })
    ));
}
