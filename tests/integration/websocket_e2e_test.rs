// tests/integration/websocket_e2e_test.rs

//! End-to-end tests over a real listener: WebSocket upgrade, control messages,
//! ingestion over HTTP, the status/broadcast/health endpoints, and the client limit.

use super::fixtures::{ELECTION_PAIR_A, REGION_BANDUNG, REGION_JAKARTA, vote};
use super::test_helpers::{RECV_TIMEOUT, TestContext};
use futures::{SinkExt, StreamExt};
use liveresult::config::Config;
use liveresult::server::{AppState, router};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    ctx: TestContext,
    addr: SocketAddr,
}

impl TestServer {
    async fn start(config: Config) -> Self {
        let ctx = TestContext::with_config(config.hub.clone()).await;
        let state = AppState::new(ctx.service.clone(), Arc::new(config), None);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        Self { ctx, addr }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}/v1{}", self.addr, path)
    }

    async fn connect_ws(&self) -> WsClient {
        let (mut ws, _response) = connect_async(format!("ws://{}/v1/live/ws", self.addr))
            .await
            .expect("WebSocket handshake should succeed");
        let welcome = next_json(&mut ws).await;
        assert_eq!(welcome["type"], "heartbeat");
        assert_eq!(welcome["data"]["status"], "connected");
        assert!(welcome["data"]["client_id"].is_string());
        ws
    }
}

async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let message = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a WebSocket message")
            .expect("WebSocket stream ended")
            .expect("WebSocket read failed");
        match message {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

#[tokio::test]
async fn test_subscribe_and_receive_ingested_vote() {
    let server = TestServer::start(Config::default()).await;
    let mut ws = server.connect_ws().await;

    send_json(
        &mut ws,
        json!({ "type": "subscribe", "subscription": "region", "region": REGION_BANDUNG }),
    )
    .await;
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "subscribe");
    assert_eq!(ack["data"]["filter"]["region"], REGION_BANDUNG);

    let http = reqwest::Client::new();
    // A vote elsewhere produces nothing for this client...
    let response = http
        .post(server.url("/live/votes"))
        .json(&vote(ELECTION_PAIR_A, REGION_JAKARTA))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);

    // ...a vote in Bandung produces the vote and region updates, in order.
    let response = http
        .post(server.url("/live/votes"))
        .json(&vote(ELECTION_PAIR_A, REGION_BANDUNG))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);

    let first = next_json(&mut ws).await;
    assert_eq!(first["type"], "vote_update");
    assert_eq!(first["data"]["region"], REGION_BANDUNG);
    let second = next_json(&mut ws).await;
    assert_eq!(second["type"], "region_update");
    assert_eq!(second["data"]["region"], REGION_BANDUNG);
    assert_eq!(second["data"]["total_votes"], 1);

    ws.close(None).await.unwrap();
    server.ctx.wait_for_clients(0).await;
}

#[tokio::test]
async fn test_status_health_and_manual_broadcast() {
    let server = TestServer::start(Config::default()).await;
    let http = reqwest::Client::new();

    let skipped: Value = http
        .post(server.url("/live/broadcast?type=statistics"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(skipped["message"], "No connected clients, broadcast skipped");
    assert_eq!(skipped["clients"], 0);

    let mut ws = server.connect_ws().await;
    send_json(&mut ws, json!({ "type": "subscribe", "subscription": "statistics" })).await;
    next_json(&mut ws).await;

    let status: Value = http
        .get(server.url("/live/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "active");
    assert_eq!(status["connected_clients"], 1);
    assert_eq!(status["websocket_endpoint"], "/v1/live/ws");
    assert_eq!(
        status["supported_subscriptions"],
        json!(["all", "election", "region", "statistics"])
    );
    assert_eq!(
        status["message_types"],
        json!(["vote_update", "election_update", "region_update", "statistics_update", "heartbeat"])
    );

    let health: Value = http
        .get(server.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        health,
        json!({ "status": "ok", "version": liveresult::VERSION, "connected_clients": 1 })
    );
    assert!(liveresult::VERSION.starts_with(env!("CARGO_PKG_VERSION")));

    let triggered = http
        .post(server.url("/live/broadcast?type=statistics"))
        .send()
        .await
        .unwrap();
    assert_eq!(triggered.status(), 200);
    let triggered: Value = triggered.json().await.unwrap();
    assert_eq!(triggered["message"], "Broadcast triggered successfully");
    assert_eq!(triggered["type"], "statistics");
    assert_eq!(triggered["clients"], 1);
    assert_eq!(next_json(&mut ws).await["type"], "statistics_update");

    for (query, expected) in [
        ("type=election", 400u16),
        ("type=region", 400),
        ("type=bogus", 400),
        ("type=election&election_pair_id=unknown", 404),
    ] {
        let response = http
            .post(server.url(&format!("/live/broadcast?{query}")))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), expected, "query {query}");
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn test_client_limit_refuses_upgrade() {
    let config = Config {
        max_clients: 1,
        ..Config::default()
    };
    let server = TestServer::start(config).await;
    let _first = server.connect_ws().await;
    server.ctx.wait_for_clients(1).await;

    match connect_async(format!("ws://{}/v1/live/ws", server.addr)).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 503);
        }
        Err(other) => panic!("expected an HTTP 503 rejection, got {other}"),
        Ok(_) => panic!("second client should have been refused"),
    }
}

#[tokio::test]
async fn test_plain_http_request_to_ws_endpoint_is_rejected() {
    let server = TestServer::start(Config::default()).await;
    let response = reqwest::get(server.url("/live/ws")).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_log_level_reads_back_and_survives_failed_updates() {
    let server = TestServer::start(Config::default()).await;
    let http = reqwest::Client::new();
    let current = || async {
        let response = http.get(server.url("/admin/log-level")).send().await.unwrap();
        assert_eq!(response.status(), 200u16);
        response.json::<Value>().await.unwrap()["level"].clone()
    };
    assert_eq!(current().await, "info");

    // No reload handle is installed in tests, so a valid filter cannot be applied.
    let response = http
        .put(server.url("/admin/log-level"))
        .json(&json!({ "level": "debug" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500u16);
    assert_eq!(current().await, "info");

    let response = http
        .put(server.url("/admin/log-level"))
        .json(&json!({ "level": "liveresult=loud" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400u16);
    assert_eq!(current().await, "info");
}

#[tokio::test]
async fn test_malformed_control_keeps_connection_open() {
    let server = TestServer::start(Config::default()).await;
    let mut ws = server.connect_ws().await;

    ws.send(Message::Text("this is not json".into())).await.unwrap();
    ws.send(Message::Binary(vec![0u8, 1, 2].into())).await.unwrap();
    send_json(&mut ws, json!({ "type": "subscribe", "subscription": "all" })).await;

    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "subscribe");
    assert_eq!(ack["data"]["subscription"], "all");
    assert_eq!(server.ctx.hub.client_count(), 1);
}

#[tokio::test]
async fn test_hub_shutdown_closes_websocket() {
    let mut server = TestServer::start(Config::default()).await;
    let mut ws = server.connect_ws().await;

    server.ctx.shutdown().await;

    let closed = tokio::time::timeout(RECV_TIMEOUT, async {
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Close(_) = message {
                return true;
            }
        }
        true
    })
    .await
    .expect("server should close the connection after hub shutdown");
    assert!(closed);
    assert_eq!(server.ctx.hub.client_count(), 0);
}
