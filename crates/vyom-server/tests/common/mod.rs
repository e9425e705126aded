#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use vyom_db::QueryRows;
use vyom_intent::handlers::{
    KeywordPageRouter, QueryExecutor, QueryTranslator, ServiceClassifier, TicketSystem,
};
use vyom_intent::{
    AuthPolicy, ChatMessage, ChatModel, CollaboratorError, IntentClassifier, IntentHandlers,
    Narrator,
};
use vyom_server::collaborators::Collaborators;
use vyom_server::config::{AuthTransport, Config};
use vyom_server::AppState;
use vyom_session::ManualClock;
use vyom_types::IntentLabel;

/// Classifies by keyword so tests control intent without a model.
pub struct KeywordClassifier;

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify(&self, utterance: &str) -> Result<IntentLabel, CollaboratorError> {
        let lowered = utterance.to_lowercase();
        let label = if ["balance", "branch", "transaction"]
            .iter()
            .any(|k| lowered.contains(k))
        {
            IntentLabel::DbQuery
        } else if lowered.contains("card") {
            IntentLabel::Service
        } else if lowered.contains("take me") || lowered.contains("open") {
            IntentLabel::PageRouting
        } else {
            IntentLabel::General
        };
        Ok(label)
    }
}

/// Narrates by echoing the user turn.
pub struct EchoModel;

#[async_trait]
impl ChatModel for EchoModel {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, CollaboratorError> {
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(format!("ok: {}", last))
    }
}

pub struct QuotingTranslator;

#[async_trait]
impl QueryTranslator for QuotingTranslator {
    async fn translate(&self, question: &str, _user_id: &str) -> Result<String, CollaboratorError> {
        Ok(format!("SELECT '{}'", question.replace('\'', "")))
    }
}

#[derive(Default)]
pub struct RecordingExecutor {
    pub seen: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryExecutor for RecordingExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryRows, CollaboratorError> {
        self.seen.lock().unwrap().push(sql.to_string());
        Ok(QueryRows {
            columns: vec!["bank_balance".into()],
            rows: vec![vec![serde_json::json!(1520.75)]],
            truncated: false,
        })
    }
}

pub struct FixedService;

#[async_trait]
impl ServiceClassifier for FixedService {
    async fn identify(&self, _query: &str) -> Result<String, CollaboratorError> {
        Ok("new_credit_card".into())
    }
}

#[derive(Default)]
pub struct CountingTickets {
    pub submitted: AtomicUsize,
}

#[async_trait]
impl TicketSystem for CountingTickets {
    async fn submit(&self, _user_id: &str, _query: &str) -> Result<String, CollaboratorError> {
        let n = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("Q{}", n))
    }
}

pub struct Fixture {
    pub state: AppState,
    pub app: Router,
    pub clock: Arc<ManualClock>,
    pub executor: Arc<RecordingExecutor>,
    pub tickets: Arc<CountingTickets>,
}

pub fn config(transport: AuthTransport) -> Config {
    let mut config = Config::default();
    config.auth.transport = transport;
    config
}

pub fn fixture(transport: AuthTransport) -> Fixture {
    fixture_with(config(transport))
}

pub fn fixture_with(config: Config) -> Fixture {
    let executor = Arc::new(RecordingExecutor::default());
    let tickets = Arc::new(CountingTickets::default());
    let clock = Arc::new(ManualClock::default());

    let collaborators = Collaborators {
        classifier: Arc::new(KeywordClassifier),
        policy: AuthPolicy::banking(),
        handlers: IntentHandlers::new(
            Arc::new(QuotingTranslator),
            executor.clone(),
            Arc::new(FixedService),
            tickets.clone(),
            Arc::new(KeywordPageRouter),
        ),
        narrator: Narrator::new(Arc::new(EchoModel), 10),
    };

    let state = AppState::with_clock(config, collaborators, clock.clone());
    let app = vyom_server::app(state.clone());
    Fixture {
        state,
        app,
        clock,
        executor,
        tickets,
    }
}

/// Sends one request through the router with a client address attached.
pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let mut request = match body {
        Some(json) => builder.body(Body::from(json.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let addr = SocketAddr::from(([127, 0, 0, 1], 40000));
    request.extensions_mut().insert(ConnectInfo(addr));

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

pub async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}

/// Binds the router on an ephemeral port and serves it in the background.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}
