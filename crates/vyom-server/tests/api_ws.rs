mod common;

use common::{fixture, serve};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use vyom_server::config::AuthTransport;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(addr: SocketAddr, session_id: &str) -> Ws {
    let url = format!("ws://{}/ws/{}", addr, session_id);
    let (mut ws, _) = connect_async(url).await.expect("failed to connect");
    let hello = next_json(&mut ws).await;
    assert_eq!(hello["type"], "connection_established");
    assert_eq!(hello["session_id"], session_id);
    ws
}

async fn next_json(ws: &mut Ws) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for websocket message")
            .expect("stream closed")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn assert_silent(ws: &mut Ws) {
    let res = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(res.is_err(), "expected no message, got {:?}", res);
}

#[tokio::test]
async fn connection_lifecycle() {
    let f = fixture(AuthTransport::Push);
    let addr = serve(f.app.clone()).await;

    let mut ws = connect(addr, "S9").await;
    assert_eq!(f.state.connection_manager.handle_count("S9").await, 1);

    send_json(&mut ws, json!({"type": "heartbeat"})).await;
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "heartbeat_ack");
    assert!(ack["timestamp"].as_f64().is_some());

    ws.send(Message::Text("this is not json".into())).await.unwrap();
    let err = next_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert!(err["message"]
        .as_str()
        .unwrap()
        .starts_with("Error processing message"));

    // The channel survives a bad message.
    send_json(&mut ws, json!({"type": "heartbeat"})).await;
    assert_eq!(next_json(&mut ws).await["type"], "heartbeat_ack");

    ws.close(None).await.unwrap();
    let mut remaining = 1;
    for _ in 0..50 {
        remaining = f.state.connection_manager.handle_count("S9").await;
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn challenge_and_outcome_reach_every_handle() {
    let f = fixture(AuthTransport::Push);
    let addr = serve(f.app.clone()).await;
    let mut phone = connect(addr, "S2").await;
    let mut tablet = connect(addr, "S2").await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/api/auth/challenge", addr))
        .json(&json!({"session_id": "S2", "intent_type": "dbquery"}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let issued: Value = response.json().await.unwrap();
    let challenge_id = issued["challenge"]["challenge_id"].clone();

    let on_phone = next_json(&mut phone).await;
    let on_tablet = next_json(&mut tablet).await;
    assert_eq!(on_phone, on_tablet);
    assert_eq!(on_phone["type"], "auth_required");
    assert_eq!(on_phone["challenge"]["challenge_id"], challenge_id);
    assert_eq!(on_phone["message"], "Please complete face authentication to continue");

    send_json(
        &mut phone,
        json!({
            "type": "auth_result",
            "challenge_id": challenge_id,
            "auth_result": {"success": true, "confidence": 0.99, "method": "face"}
        }),
    )
    .await;

    let on_phone = next_json(&mut phone).await;
    let on_tablet = next_json(&mut tablet).await;
    assert_eq!(on_phone, on_tablet);
    assert_eq!(on_phone["type"], "auth_result");
    assert_eq!(on_phone["success"], true);
    assert_eq!(on_phone["pending_intent"], "dbquery");
    assert!(f.state.ledger.is_authenticated("S2"));
}

#[tokio::test]
async fn one_closed_handle_does_not_block_the_other() {
    let f = fixture(AuthTransport::Push);
    let addr = serve(f.app.clone()).await;
    let mut survivor = connect(addr, "S2").await;

    // A handle whose receiver is gone.
    let (dead_tx, dead_rx) = tokio::sync::mpsc::channel(1);
    drop(dead_rx);
    f.state.connection_manager.add_handle("S2", dead_tx).await;

    f.state
        .authenticator
        .request_authentication("S2", "service")
        .await
        .unwrap();
    assert_eq!(next_json(&mut survivor).await["type"], "auth_required");

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/api/auth/verify", addr))
        .json(&json!({
            "session_id": "S2",
            "auth_result": {"success": false, "method": "face", "error": "No face detected"}
        }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let outcome = next_json(&mut survivor).await;
    assert_eq!(outcome["type"], "auth_result");
    assert_eq!(outcome["success"], false);
    assert_eq!(outcome["message"], "No face detected");
    assert_eq!(outcome["retry"], true);
}

#[tokio::test]
async fn rejected_verdict_errors_only_to_sender() {
    let f = fixture(AuthTransport::Push);
    let addr = serve(f.app.clone()).await;
    let mut sender = connect(addr, "S3").await;
    let mut bystander = connect(addr, "S3").await;

    send_json(
        &mut sender,
        json!({"type": "auth_result", "auth_result": {"success": true, "method": "face"}}),
    )
    .await;

    let err = next_json(&mut sender).await;
    assert_eq!(err["type"], "error");
    assert!(err["message"]
        .as_str()
        .unwrap()
        .contains("no authentication challenge is outstanding"));
    assert_silent(&mut bystander).await;
    assert!(!f.state.ledger.is_authenticated("S3"));
}

#[tokio::test]
async fn rest_transport_answers_the_sending_socket() {
    let f = fixture(AuthTransport::Rest);
    let addr = serve(f.app.clone()).await;
    let mut ws = connect(addr, "S4").await;

    f.state
        .authenticator
        .request_authentication("S4", "dbquery")
        .await
        .unwrap();
    // Nothing is pushed with the rest transport.
    assert_silent(&mut ws).await;

    send_json(
        &mut ws,
        json!({"type": "auth_result", "auth_result": {"success": true, "method": "face"}}),
    )
    .await;
    let outcome = next_json(&mut ws).await;
    assert_eq!(outcome["type"], "auth_result");
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["pending_intent"], "dbquery");
}
