mod common;

use common::{fixture, serve};
use std::time::Duration;
use vyom_server::config::AuthTransport;

#[tokio::test]
async fn auth_events_are_streamed() {
    let f = fixture(AuthTransport::Rest);
    let addr = serve(f.app.clone()).await;

    let client = reqwest::Client::new();
    let mut response = client
        .get(format!("http://{}/events/auth", addr))
        .send()
        .await
        .expect("failed to connect to SSE stream");
    assert!(response.status().is_success());

    // Give the handler time to subscribe.
    tokio::time::sleep(Duration::from_millis(100)).await;

    f.state.ledger.mark_authenticated("S1", "face", None);

    let chunk = tokio::time::timeout(Duration::from_secs(5), response.chunk())
        .await
        .expect("timeout waiting for SSE event")
        .expect("failed to read chunk")
        .expect("stream closed");
    let text = String::from_utf8(chunk.to_vec()).unwrap();

    assert!(text.contains("event: authenticated"), "got: {}", text);
    assert!(text.contains("\"session_id\":\"S1\""));
    assert!(text.contains("\"method\":\"face\""));
}
