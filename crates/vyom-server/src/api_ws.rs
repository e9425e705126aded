//! WebSocket challenge channel and connection management.

use crate::config::AuthTransport;
use crate::AppState;
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        ConnectInfo, Extension, Path, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;
use vyom_auth::authenticator::CHALLENGE_ISSUED_MESSAGE;
use vyom_auth::{ChallengeTransport, DeliveryReport, VerifyOutcome};
use vyom_types::{AuthResult, Challenge};

const CONNECTION_ESTABLISHED_MESSAGE: &str = "WebSocket connection established";

/// Incoming WebSocket message types.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    /// A verdict from the on-device authenticator.
    AuthResult {
        auth_result: AuthResult,
        #[serde(default)]
        challenge_id: Option<String>,
    },
    Heartbeat,
}

/// Outgoing WebSocket message types.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    ConnectionEstablished {
        session_id: String,
        message: String,
    },
    AuthRequired {
        challenge: Challenge,
        message: String,
    },
    /// The verdict outcome, its fields flattened beside `type`.
    AuthResult(VerifyOutcome),
    HeartbeatAck {
        #[serde(with = "vyom_types::epoch")]
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

impl OutgoingMessage {
    fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::error!("failed to serialize outgoing websocket message: {}", e);
                None
            }
        }
    }
}

/// Type alias for the handle map to satisfy clippy complexity checks.
type HandleMap = HashMap<String, Vec<(Uuid, mpsc::Sender<String>)>>;

/// Live WebSocket handles per session. A session may hold several (one per
/// device or tab); pushes fan out to all of them.
#[derive(Clone, Default)]
pub struct ConnectionManager {
    handles: Arc<RwLock<HandleMap>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handle for `session_id`. Returns its unique id.
    pub async fn add_handle(&self, session_id: &str, sender: mpsc::Sender<String>) -> Uuid {
        let handle_id = Uuid::new_v4();
        self.handles
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push((handle_id, sender));
        handle_id
    }

    /// Removes one handle. The session entry goes away with its last handle.
    pub async fn remove_handle(&self, session_id: &str, handle_id: Uuid) {
        let mut handles = self.handles.write().await;
        if let Some(list) = handles.get_mut(session_id) {
            list.retain(|(id, _)| *id != handle_id);
            if list.is_empty() {
                handles.remove(session_id);
            }
        }
    }

    pub async fn handle_count(&self, session_id: &str) -> usize {
        self.handles
            .read()
            .await
            .get(session_id)
            .map_or(0, Vec::len)
    }

    /// Number of sessions with at least one handle.
    pub async fn session_count(&self) -> usize {
        self.handles.read().await.len()
    }

    /// Sends `message` to every handle of `session_id`.
    ///
    /// A full or closed handle is counted as failed and skipped; the rest
    /// still receive the message.
    pub async fn send_to_session(&self, session_id: &str, message: &str) -> DeliveryReport {
        let senders: Vec<(Uuid, mpsc::Sender<String>)> = {
            let handles = self.handles.read().await;
            match handles.get(session_id) {
                Some(list) => list.clone(),
                None => return DeliveryReport::default(),
            }
        };

        let mut report = DeliveryReport::default();
        for (handle_id, tx) in senders {
            match tx.try_send(message.to_string()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        session_id = %session_id,
                        handle_id = %handle_id,
                        "dropping push for slow websocket consumer"
                    );
                    report.failed += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(
                        session_id = %session_id,
                        handle_id = %handle_id,
                        "push to closed websocket handle"
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }

    async fn push(&self, session_id: &str, message: OutgoingMessage) -> DeliveryReport {
        match message.to_json() {
            Some(json) => self.send_to_session(session_id, &json).await,
            None => DeliveryReport::default(),
        }
    }
}

#[async_trait]
impl ChallengeTransport for ConnectionManager {
    fn name(&self) -> &'static str {
        "push"
    }

    async fn deliver_challenge(&self, challenge: &Challenge) -> DeliveryReport {
        let report = self
            .push(
                &challenge.session_id,
                OutgoingMessage::AuthRequired {
                    challenge: challenge.clone(),
                    message: CHALLENGE_ISSUED_MESSAGE.to_string(),
                },
            )
            .await;
        if report.recipients() == 0 {
            tracing::info!(
                session_id = %challenge.session_id,
                challenge_id = %challenge.challenge_id,
                "no websocket connected; challenge available via rest only"
            );
        }
        report
    }

    async fn deliver_outcome(&self, session_id: &str, outcome: &VerifyOutcome) -> DeliveryReport {
        self.push(session_id, OutgoingMessage::AuthResult(outcome.clone()))
            .await
    }
}

/// Serializes and enqueues an error message on a single handle.
fn send_ws_error(tx: &mpsc::Sender<String>, message: String) {
    send_ws(tx, OutgoingMessage::Error { message });
}

fn send_ws(tx: &mpsc::Sender<String>, message: OutgoingMessage) {
    if let Some(json) = message.to_json() {
        if tx.try_send(json).is_err() {
            tracing::warn!("dropping websocket reply for slow consumer");
        }
    }
}

/// Handler for `GET /ws/{session_id}`.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    tracing::debug!(session_id = %session_id, remote_addr = %addr, "websocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, session_id: String) {
    state.ledger.touch(&session_id);
    let (mut sender, mut receiver) = socket.split();

    // Bounded so a stalled client cannot grow memory without limit.
    let (tx, mut rx) = mpsc::channel::<String>(256);

    let handle_id = state.connection_manager.add_handle(&session_id, tx.clone()).await;
    tracing::info!(session_id = %session_id, handle_id = %handle_id, "websocket connected");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(AxumMessage::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    send_ws(
        &tx,
        OutgoingMessage::ConnectionEstablished {
            session_id: session_id.clone(),
            message: CONNECTION_ESTABLISHED_MESSAGE.to_string(),
        },
    );

    let pushes_outcomes = state.config.auth.transport == AuthTransport::Push;

    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            AxumMessage::Text(text) => text,
            AxumMessage::Close(_) => break,
            _ => continue,
        };
        state.ledger.touch(&session_id);

        let incoming = match serde_json::from_str::<IncomingMessage>(text.as_str()) {
            Ok(incoming) => incoming,
            Err(e) => {
                tracing::warn!(session_id = %session_id, "invalid websocket message: {}", e);
                send_ws_error(&tx, format!("Error processing message: {}", e));
                continue;
            }
        };

        match incoming {
            IncomingMessage::AuthResult {
                auth_result,
                challenge_id,
            } => {
                match state
                    .authenticator
                    .process_auth_result(&session_id, challenge_id.as_deref(), auth_result)
                    .await
                {
                    // With the push transport the outcome already reached
                    // every handle, this one included.
                    Ok(outcome) if !pushes_outcomes => {
                        send_ws(&tx, OutgoingMessage::AuthResult(outcome));
                    }
                    Ok(_) => {}
                    Err(e) => send_ws_error(&tx, format!("Error processing message: {}", e)),
                }
            }
            IncomingMessage::Heartbeat => {
                send_ws(
                    &tx,
                    OutgoingMessage::HeartbeatAck {
                        timestamp: state.ledger.now(),
                    },
                );
            }
        }
    }

    state
        .connection_manager
        .remove_handle(&session_id, handle_id)
        .await;
    send_task.abort();
    tracing::info!(session_id = %session_id, handle_id = %handle_id, "websocket disconnected");
}
