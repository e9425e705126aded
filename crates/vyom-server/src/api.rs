//! REST handlers for the challenge channel.

use crate::AppState;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use vyom_auth::{AuthError, ChallengeOutcome, VerifyOutcome};
use vyom_types::AuthResult;

/// Request body for `POST /api/auth/challenge`.
#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub session_id: String,
    pub intent_type: String,
    /// Transcript of the utterance that triggered the challenge, if the
    /// client has one. Logged only.
    #[serde(default)]
    pub voice_transcript: Option<String>,
}

/// Request body for `POST /api/auth/verify`.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub session_id: String,
    pub auth_result: AuthResult,
    /// The challenge being answered. When absent the session's outstanding
    /// challenge is assumed.
    #[serde(default)]
    pub challenge_id: Option<String>,
}

/// Response body for `GET /api/auth/status/{session_id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub authenticated: bool,
    pub auth_method: Option<String>,
    #[serde(with = "vyom_types::epoch::option")]
    pub auth_expiry: Option<DateTime<Utc>>,
    pub voice_chat_active: bool,
}

/// Response body for `POST /api/auth/reset/{session_id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub session_id: String,
    pub reset: bool,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("gone: {0}")]
    Gone(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Gone(msg) => (StatusCode::GONE, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidSession => ApiError::BadRequest(e.to_string()),
            AuthError::NoPendingChallenge(_) | AuthError::UnknownChallenge(_) => {
                ApiError::NotFound(e.to_string())
            }
            AuthError::SessionMismatch { .. } => ApiError::Conflict(e.to_string()),
            AuthError::ChallengeExpired(_) => ApiError::Gone(e.to_string()),
        }
    }
}

/// Handler for `POST /api/auth/challenge`.
pub async fn challenge_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<ChallengeRequest>,
) -> Result<Json<ChallengeOutcome>, ApiError> {
    if payload.intent_type.trim().is_empty() {
        return Err(ApiError::BadRequest("intent_type must not be empty".to_string()));
    }
    if let Some(transcript) = payload.voice_transcript.as_deref() {
        tracing::debug!(
            session_id = %payload.session_id,
            transcript_len = transcript.len(),
            "challenge requested with transcript"
        );
    }

    let outcome = state
        .authenticator
        .request_authentication(&payload.session_id, &payload.intent_type)
        .await?;
    state.ledger.touch(&payload.session_id);
    Ok(Json(outcome))
}

/// Handler for `POST /api/auth/verify`.
pub async fn verify_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<VerifyOutcome>, ApiError> {
    let outcome = state
        .authenticator
        .process_auth_result(
            &payload.session_id,
            payload.challenge_id.as_deref(),
            payload.auth_result,
        )
        .await?;
    state.ledger.touch(&payload.session_id);
    Ok(Json(outcome))
}

/// Handler for `GET /api/auth/status/{session_id}`.
pub async fn status_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<StatusResponse> {
    let session = state.ledger.state(&session_id);
    Json(StatusResponse {
        authenticated: session.authenticated,
        auth_method: session.auth_method,
        auth_expiry: session.auth_expiry,
        voice_chat_active: session.voice_chat_paused_at.is_none(),
    })
}

/// Handler for `POST /api/auth/reset/{session_id}`.
pub async fn reset_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<ResetResponse> {
    let _guard = state.authenticator.locks().acquire(&session_id).await;
    state.ledger.reset(&session_id);
    tracing::info!(session_id = %session_id, "session authentication reset");
    Json(ResetResponse {
        session_id,
        reset: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: AuthError) -> StatusCode {
        ApiError::from(e).into_response().status()
    }

    #[test]
    fn auth_errors_map_to_statuses() {
        assert_eq!(status_of(AuthError::InvalidSession), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(AuthError::NoPendingChallenge("s1".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(AuthError::UnknownChallenge("c1".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(AuthError::SessionMismatch {
                challenge_id: "c1".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(AuthError::ChallengeExpired("c1".into())),
            StatusCode::GONE
        );
    }

    #[test]
    fn verify_request_accepts_missing_challenge_id() {
        let req: VerifyRequest = serde_json::from_str(
            r#"{"session_id":"s1","auth_result":{"success":false,"confidence":0.2,"method":"face","error":"No match"}}"#,
        )
        .unwrap();
        assert!(req.challenge_id.is_none());
        assert_eq!(req.auth_result.error.as_deref(), Some("No match"));
    }
}
