use thiserror::Error;

/// Reasons a verdict or challenge request is refused.
///
/// None of these mutate authentication state: a refused verdict never
/// counts as a failed attempt and never authenticates the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("session id must not be empty")]
    InvalidSession,

    #[error("no authentication challenge is outstanding for session {0}")]
    NoPendingChallenge(String),

    #[error("unknown or already resolved challenge: {0}")]
    UnknownChallenge(String),

    #[error("challenge {challenge_id} was not issued to this session")]
    SessionMismatch { challenge_id: String },

    #[error("challenge {0} has expired")]
    ChallengeExpired(String),
}
