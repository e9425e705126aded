//! Per-session state record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChallengeId, IntentLabel, QueryDetails};

/// An utterance parked behind an authentication challenge, replayed once
/// the session authenticates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkedRequest {
    pub intent: IntentLabel,
    pub details: QueryDetails,
    pub utterance: String,
    #[serde(with = "crate::epoch")]
    pub parked_at: DateTime<Utc>,
}

/// Authentication and routing state held for one session.
///
/// `authenticated == true` implies `auth_expiry` is set. Readers go through
/// the ledger, which clears the auth fields once `auth_expiry` has passed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub authenticated: bool,
    #[serde(with = "crate::epoch::option")]
    pub auth_timestamp: Option<DateTime<Utc>>,
    pub auth_method: Option<String>,
    #[serde(with = "crate::epoch::option")]
    pub auth_expiry: Option<DateTime<Utc>>,
    /// Intent type reported back to the device when its verdict succeeds.
    pub pending_intent: Option<String>,
    /// Request the orchestrator replays after authentication.
    pub parked_request: Option<ParkedRequest>,
    pub failed_attempts: u32,
    #[serde(with = "crate::epoch::option")]
    pub voice_chat_paused_at: Option<DateTime<Utc>>,
    /// The single outstanding challenge, if any.
    pub active_challenge: Option<ChallengeId>,
    /// The last challenge retired by the expiry sweep, until a verdict for
    /// it is refused or a new challenge is issued.
    pub expired_challenge: Option<ChallengeId>,
    #[serde(with = "crate::epoch::option")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Clears the authentication fields.
    pub fn clear_auth(&mut self) {
        self.authenticated = false;
        self.auth_timestamp = None;
        self.auth_method = None;
        self.auth_expiry = None;
    }

    /// True while the session holds anything an eviction would lose.
    pub fn is_busy(&self, now: DateTime<Utc>) -> bool {
        let live_auth = self.authenticated && self.auth_expiry.is_some_and(|exp| exp > now);
        live_auth || self.active_challenge.is_some() || self.parked_request.is_some()
    }
}
