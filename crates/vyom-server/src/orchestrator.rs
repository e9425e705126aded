//! The conversation state machine: classify, gate on authentication, park
//! and replay, handle, narrate.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use vyom_auth::authenticator::CHALLENGE_ISSUED_MESSAGE;
use vyom_auth::{AuthLedger, ChallengeOutcome, EdgeAuthenticator, SessionGuard};
use vyom_intent::{
    resolve_query_type, AuthPolicy, HandlerRequest, IntentClassifier, IntentHandlers,
    IntentOutcome, Narrator,
};
use vyom_types::{Challenge, IntentLabel, ParkedRequest, QueryDetails};

const REPLAY_PREFIX: &str = "The user has been successfully authenticated. ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("session id must not be empty")]
    InvalidSession,
    #[error("message must not be empty")]
    EmptyUtterance,
}

/// Where the session stands after a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    AwaitingAuth,
}

/// Result of one utterance.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub session_id: String,
    pub intent: IntentLabel,
    pub state: TurnState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<Challenge>,
    pub pause_voice_chat: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// True when this turn ran a request parked behind authentication.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub replayed: bool,
    /// The handler's result, for clients that act on it (e.g. navigation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<IntentOutcome>,
}

/// Drives one session's conversation. Turns for the same session run one at
/// a time under the session lock shared with verdict processing.
pub struct Orchestrator {
    authenticator: Arc<EdgeAuthenticator>,
    classifier: Arc<dyn IntentClassifier>,
    policy: AuthPolicy,
    handlers: IntentHandlers,
    narrator: Narrator,
}

impl Orchestrator {
    pub fn new(
        authenticator: Arc<EdgeAuthenticator>,
        classifier: Arc<dyn IntentClassifier>,
        policy: AuthPolicy,
        handlers: IntentHandlers,
        narrator: Narrator,
    ) -> Self {
        Self {
            authenticator,
            classifier,
            policy,
            handlers,
            narrator,
        }
    }

    pub fn narrator(&self) -> &Narrator {
        &self.narrator
    }

    fn ledger(&self) -> &AuthLedger {
        self.authenticator.ledger()
    }

    /// Processes one utterance for `session_id`.
    pub async fn handle_utterance(
        &self,
        session_id: &str,
        utterance: &str,
    ) -> Result<TurnOutcome, OrchestratorError> {
        if session_id.trim().is_empty() {
            return Err(OrchestratorError::InvalidSession);
        }
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(OrchestratorError::EmptyUtterance);
        }

        let guard = self.authenticator.locks().acquire(session_id).await;
        self.ledger().touch(session_id);

        if let Some(parked) = self.ledger().take_replayable_request(session_id) {
            tracing::info!(
                session_id = %session_id,
                intent = %parked.intent,
                "replaying request parked behind authentication"
            );
            return Ok(self
                .execute(session_id, utterance, parked.intent, &parked.details, true)
                .await);
        }

        let intent = match self.classifier.classify(utterance).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!(session_id = %session_id, "intent classification failed, treating as general: {}", e);
                IntentLabel::General
            }
        };
        let details = query_details(utterance);
        let requires_auth = self.policy.requires_authentication(intent, Some(&details));
        tracing::debug!(
            session_id = %session_id,
            intent = %intent,
            query_type = ?details.query_type,
            requires_auth,
            "classified utterance"
        );

        if requires_auth && !self.ledger().is_authenticated(session_id) {
            if let Some(outcome) = self.park_and_challenge(&guard, intent, &details, utterance).await {
                return Ok(outcome);
            }
        }

        Ok(self.execute(session_id, utterance, intent, &details, false).await)
    }

    /// Parks the request and issues a challenge. Returns `None` when the
    /// session turned out to be authenticated, in which case the request
    /// should run now.
    async fn park_and_challenge(
        &self,
        guard: &SessionGuard,
        intent: IntentLabel,
        details: &QueryDetails,
        utterance: &str,
    ) -> Option<TurnOutcome> {
        let session_id = guard.session_id();
        self.ledger().park_request(
            session_id,
            ParkedRequest {
                intent,
                details: details.clone(),
                utterance: utterance.to_string(),
                parked_at: self.ledger().now(),
            },
        );

        match self
            .authenticator
            .request_authentication_with(guard, intent.as_str())
            .await
        {
            ChallengeOutcome::Issued { challenge } => Some(TurnOutcome {
                session_id: session_id.to_string(),
                intent,
                state: TurnState::AwaitingAuth,
                reply: None,
                challenge: Some(challenge),
                pause_voice_chat: true,
                message: Some(CHALLENGE_ISSUED_MESSAGE.to_string()),
                replayed: false,
                result: None,
            }),
            ChallengeOutcome::AlreadyAuthenticated => {
                self.ledger().clear_pending(session_id);
                None
            }
        }
    }

    async fn execute(
        &self,
        session_id: &str,
        utterance: &str,
        intent: IntentLabel,
        details: &QueryDetails,
        replayed: bool,
    ) -> TurnOutcome {
        let request = HandlerRequest {
            user_id: session_id,
            utterance,
            details,
        };
        let result = self.handlers.handle(intent, request).await;

        let system_info = if replayed {
            format!("{}System response: {}", REPLAY_PREFIX, result.to_system_info())
        } else {
            format!("System response: {}", result.to_system_info())
        };
        let reply = self.narrator.narrate(session_id, utterance, &system_info).await;

        TurnOutcome {
            session_id: session_id.to_string(),
            intent,
            state: TurnState::Idle,
            reply: Some(reply),
            challenge: None,
            pause_voice_chat: false,
            message: None,
            replayed,
            result: Some(result),
        }
    }
}

fn query_details(utterance: &str) -> QueryDetails {
    let details = QueryDetails::from_query(utterance);
    match resolve_query_type(utterance) {
        Some(query_type) => details.with_query_type(query_type),
        None => details,
    }
}
