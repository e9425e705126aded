//! Conversation endpoint.

use crate::api::ApiError;
use crate::orchestrator::{OrchestratorError, TurnOutcome};
use crate::AppState;
use axum::extract::{Extension, Json};
use serde::Deserialize;
use std::sync::Arc;

/// Request body for `POST /api/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    /// The transcribed utterance.
    pub message: String,
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

/// Handler for `POST /api/chat`.
pub async fn chat_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let outcome = state
        .orchestrator
        .handle_utterance(&payload.session_id, &payload.message)
        .await?;
    Ok(Json(outcome))
}
