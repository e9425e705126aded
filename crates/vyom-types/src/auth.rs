//! Wire types exchanged with the on-device authenticator.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CHALLENGE_TTL_SECS, DEFAULT_AUTH_METHOD};

/// Identifier of an authentication challenge (`ch_` followed by 32 hex digits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChallengeId(String);

impl ChallengeId {
    /// Generates a fresh random challenge id.
    pub fn generate() -> Self {
        Self(format!("ch_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ChallengeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ChallengeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::borrow::Borrow<str> for ChallengeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChallengeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn default_method() -> String {
    DEFAULT_AUTH_METHOD.to_string()
}

/// Verdict produced by the out-of-band authenticator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResult {
    pub success: bool,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl AuthResult {
    /// A successful face verdict.
    pub fn succeeded(method: impl Into<String>) -> Self {
        Self {
            success: true,
            confidence: None,
            method: method.into(),
            error: None,
        }
    }

    /// A failed verdict with an optional device-supplied error.
    pub fn failed(error: Option<String>) -> Self {
        Self {
            success: false,
            confidence: None,
            method: default_method(),
            error,
        }
    }
}

/// A time-boxed authentication request dispatched to the device.
///
/// Timestamps travel as epoch seconds; `timestamp` is the issue time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: ChallengeId,
    pub session_id: String,
    pub auth_methods: Vec<String>,
    pub intent_type: String,
    #[serde(with = "crate::epoch")]
    pub timestamp: DateTime<Utc>,
    #[serde(with = "crate::epoch")]
    pub expires_at: DateTime<Utc>,
}

impl Challenge {
    /// Issues a face challenge for `session_id` at `now`.
    pub fn issue(session_id: &str, intent_type: &str, now: DateTime<Utc>) -> Self {
        Self {
            challenge_id: ChallengeId::generate(),
            session_id: session_id.to_string(),
            auth_methods: vec![DEFAULT_AUTH_METHOD.to_string()],
            intent_type: intent_type.to_string(),
            timestamp: now,
            expires_at: now + Duration::seconds(CHALLENGE_TTL_SECS),
        }
    }

    /// Overrides the validity window.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = self.timestamp + ttl;
        self
    }

    /// A verdict arriving strictly after `expires_at` is late.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
