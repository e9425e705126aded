//! The challenge/verdict protocol shared by both transports.

use std::sync::Arc;

use serde::Serialize;
use vyom_types::{AuthResult, Challenge};

use crate::error::AuthError;
use crate::events::ChallengeResolution;
use crate::ledger::AuthLedger;
use crate::locks::{SessionGuard, SessionLocks};
use crate::transport::ChallengeTransport;

pub const ALREADY_AUTHENTICATED_MESSAGE: &str = "Already authenticated";
pub const CHALLENGE_ISSUED_MESSAGE: &str = "Please complete face authentication to continue";
pub const AUTH_SUCCESS_MESSAGE: &str = "Authentication successful";
pub const AUTH_FAILED_MESSAGE: &str = "Authentication failed";

/// Result of asking a session to authenticate.
#[derive(Debug, Clone, PartialEq)]
pub enum ChallengeOutcome {
    /// The session already holds a live authentication; nothing was issued.
    AlreadyAuthenticated,
    /// A fresh challenge was issued and voice chat should pause.
    Issued { challenge: Challenge },
}

impl ChallengeOutcome {
    pub fn challenge(&self) -> Option<&Challenge> {
        match self {
            Self::AlreadyAuthenticated => None,
            Self::Issued { challenge } => Some(challenge),
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::AlreadyAuthenticated => ALREADY_AUTHENTICATED_MESSAGE,
            Self::Issued { .. } => CHALLENGE_ISSUED_MESSAGE,
        }
    }
}

#[derive(Serialize)]
struct ChallengeReply<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    already_authenticated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    challenge: Option<&'a Challenge>,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pause_voice_chat: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    continue_voice_chat: Option<bool>,
}

impl Serialize for ChallengeOutcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let reply = match self {
            Self::AlreadyAuthenticated => ChallengeReply {
                already_authenticated: Some(true),
                challenge: None,
                message: self.message(),
                pause_voice_chat: None,
                continue_voice_chat: Some(true),
            },
            Self::Issued { challenge } => ChallengeReply {
                already_authenticated: None,
                challenge: Some(challenge),
                message: self.message(),
                pause_voice_chat: Some(true),
                continue_voice_chat: None,
            },
        };
        reply.serialize(serializer)
    }
}

/// Result of processing a verdict, as returned to the caller and pushed to
/// every channel of the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_intent: Option<String>,
    pub continue_voice_chat: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<bool>,
}

/// Issues challenges and applies verdicts against the ledger, delivering
/// both over the configured transport.
pub struct EdgeAuthenticator {
    ledger: Arc<AuthLedger>,
    transport: Arc<dyn ChallengeTransport>,
    locks: SessionLocks,
}

impl EdgeAuthenticator {
    pub fn new(
        ledger: Arc<AuthLedger>,
        transport: Arc<dyn ChallengeTransport>,
        locks: SessionLocks,
    ) -> Self {
        Self {
            ledger,
            transport,
            locks,
        }
    }

    pub fn ledger(&self) -> &Arc<AuthLedger> {
        &self.ledger
    }

    pub fn locks(&self) -> &SessionLocks {
        &self.locks
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Takes the session lock and requests authentication.
    pub async fn request_authentication(
        &self,
        session_id: &str,
        intent_type: &str,
    ) -> Result<ChallengeOutcome, AuthError> {
        validate_session_id(session_id)?;
        let guard = self.locks.acquire(session_id).await;
        Ok(self.request_authentication_with(&guard, intent_type).await)
    }

    /// Requests authentication for the session `guard` holds.
    pub async fn request_authentication_with(
        &self,
        guard: &SessionGuard,
        intent_type: &str,
    ) -> ChallengeOutcome {
        let session_id = guard.session_id();
        if self.ledger.is_authenticated(session_id) {
            return ChallengeOutcome::AlreadyAuthenticated;
        }

        let challenge = self.ledger.issue_challenge(session_id, intent_type);
        let report = self.transport.deliver_challenge(&challenge).await;
        if report.failed > 0 {
            tracing::warn!(
                session_id = %session_id,
                challenge_id = %challenge.challenge_id,
                delivered = report.delivered,
                failed = report.failed,
                "challenge delivery partially failed"
            );
        }
        ChallengeOutcome::Issued { challenge }
    }

    /// Takes the session lock and processes a verdict.
    pub async fn process_auth_result(
        &self,
        session_id: &str,
        challenge_id: Option<&str>,
        result: AuthResult,
    ) -> Result<VerifyOutcome, AuthError> {
        validate_session_id(session_id)?;
        let guard = self.locks.acquire(session_id).await;
        self.process_auth_result_with(&guard, challenge_id, result)
            .await
    }

    /// Applies a verdict for the session `guard` holds.
    ///
    /// The verdict must refer to the session's outstanding, unexpired
    /// challenge. Rejected verdicts leave authentication status and the
    /// failed-attempt count untouched.
    pub async fn process_auth_result_with(
        &self,
        guard: &SessionGuard,
        challenge_id: Option<&str>,
        result: AuthResult,
    ) -> Result<VerifyOutcome, AuthError> {
        let session_id = guard.session_id();
        let challenge = self
            .ledger
            .outstanding_challenge(session_id, challenge_id)
            .inspect_err(|e| {
                tracing::warn!(session_id = %session_id, "verdict rejected: {}", e);
            })?;

        let outcome = if result.success {
            self.apply_success(session_id, &challenge, &result.method)
        } else {
            self.apply_failure(session_id, &challenge, result.error.as_deref())
        };

        let report = self.transport.deliver_outcome(session_id, &outcome).await;
        if report.failed > 0 {
            tracing::warn!(
                session_id = %session_id,
                delivered = report.delivered,
                failed = report.failed,
                "auth result broadcast partially failed"
            );
        }
        Ok(outcome)
    }

    fn apply_success(&self, session_id: &str, challenge: &Challenge, method: &str) -> VerifyOutcome {
        self.ledger.mark_authenticated(session_id, method, None);
        let pending_intent = self.ledger.take_pending_intent(session_id);
        self.ledger.resolve_challenge(
            session_id,
            challenge.challenge_id.as_str(),
            ChallengeResolution::Verified,
        );
        VerifyOutcome {
            success: true,
            message: AUTH_SUCCESS_MESSAGE.to_string(),
            pending_intent,
            continue_voice_chat: true,
            retry: None,
        }
    }

    fn apply_failure(
        &self,
        session_id: &str,
        challenge: &Challenge,
        error: Option<&str>,
    ) -> VerifyOutcome {
        let attempts = self.ledger.record_failed_attempt(session_id);
        let error = error.unwrap_or(AUTH_FAILED_MESSAGE);

        if attempts >= self.ledger.settings().max_failed_attempts {
            self.ledger.resolve_challenge(
                session_id,
                challenge.challenge_id.as_str(),
                ChallengeResolution::LockedOut,
            );
            self.ledger.clear_pending(session_id);
            VerifyOutcome {
                success: false,
                message: format!("{}. Too many failed attempts.", error),
                pending_intent: None,
                continue_voice_chat: false,
                retry: None,
            }
        } else {
            VerifyOutcome {
                success: false,
                message: error.to_string(),
                pending_intent: None,
                continue_voice_chat: true,
                retry: Some(true),
            }
        }
    }
}

impl std::fmt::Debug for EdgeAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeAuthenticator")
            .field("transport", &self.transport.name())
            .finish_non_exhaustive()
    }
}

fn validate_session_id(session_id: &str) -> Result<(), AuthError> {
    if session_id.trim().is_empty() {
        return Err(AuthError::InvalidSession);
    }
    Ok(())
}
