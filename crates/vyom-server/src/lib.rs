//! Vyom server library logic.

pub mod api;
pub mod api_chat;
pub mod api_sse;
pub mod api_ws;
pub mod background;
pub mod collaborators;
pub mod config;
pub mod middleware;
pub mod orchestrator;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use collaborators::Collaborators;
use config::{AuthTransport, Config};
use middleware::RateLimiter;
use orchestrator::Orchestrator;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use vyom_auth::{AuthLedger, ChallengeTransport, EdgeAuthenticator, PollingTransport, SessionLocks};
use vyom_session::{Clock, MemoryChallengeStore, MemorySessionStore, SystemClock};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// Per-session authentication record.
    pub ledger: Arc<AuthLedger>,
    /// Challenge/verdict protocol over the configured transport.
    pub authenticator: Arc<EdgeAuthenticator>,
    /// Conversation state machine.
    pub orchestrator: Arc<Orchestrator>,
    /// Connection manager for WebSockets.
    pub connection_manager: api_ws::ConnectionManager,
    /// Rate limiter state.
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        Self::with_clock(config, collaborators, Arc::new(SystemClock))
    }

    /// Builds the state over in-memory stores and the given clock.
    pub fn with_clock(config: Config, collaborators: Collaborators, clock: Arc<dyn Clock>) -> Self {
        let ledger = Arc::new(AuthLedger::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryChallengeStore::new()),
            clock,
            config.auth.ledger_settings(),
        ));

        let connection_manager = api_ws::ConnectionManager::new();
        let transport: Arc<dyn ChallengeTransport> = match config.auth.transport {
            AuthTransport::Push => Arc::new(connection_manager.clone()),
            AuthTransport::Rest => Arc::new(PollingTransport),
        };
        let authenticator = Arc::new(EdgeAuthenticator::new(
            ledger.clone(),
            transport,
            SessionLocks::new(),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            authenticator.clone(),
            collaborators.classifier,
            collaborators.policy,
            collaborators.handlers,
            collaborators.narrator,
        ));

        Self {
            config: Arc::new(config),
            ledger,
            authenticator,
            orchestrator,
            connection_manager,
            rate_limiter: RateLimiter::new(),
        }
    }
}

/// Maximum accepted request body size (256 KiB).
const MAX_REQUEST_BODY_BYTES: usize = 256 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/api/auth/challenge", post(api::challenge_handler))
        .route("/api/auth/verify", post(api::verify_handler))
        .route("/api/auth/status/{session_id}", get(api::status_handler))
        .route("/api/auth/reset/{session_id}", post(api::reset_handler))
        .layer(axum::middleware::from_fn(middleware::rate_limit_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(api_chat::chat_handler))
        .route("/ws/{session_id}", get(api_ws::ws_handler))
        .route("/events/auth", get(api_sse::auth_event_stream_handler))
        .merge(auth_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
