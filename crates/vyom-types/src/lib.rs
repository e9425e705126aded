//! Shared types and constants for the Vyom banking assistant.
//!
//! This crate provides the foundational types used across all Vyom crates:
//! the intent label set, the query details consulted by the authentication
//! policy, the on-device authentication wire types, and the per-session
//! state record. Every other workspace crate depends on `vyom-types` for
//! cross-cutting type definitions so the dependency graph stays acyclic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod auth;
pub mod epoch;
pub mod session;

pub use auth::{AuthResult, Challenge, ChallengeId};
pub use session::{ParkedRequest, SessionState};

/// Seconds an authenticated session stays authenticated after a successful verdict.
pub const SESSION_AUTH_TTL_SECS: i64 = 300;

/// Seconds a challenge remains valid after issuance.
pub const CHALLENGE_TTL_SECS: i64 = 120;

/// Failed attempts after which the caller is told to stop retrying.
pub const MAX_FAILED_ATTEMPTS: u32 = 3;

/// The only authentication method the on-device authenticator offers.
pub const DEFAULT_AUTH_METHOD: &str = "face";

/// The classified purpose of a user utterance.
///
/// Serialized as the lowercase labels the classifier model is prompted to
/// emit (`dbquery`, `service`, `page_routing`, `general`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentLabel {
    /// A request for customer data held in the bank database.
    #[serde(rename = "dbquery")]
    DbQuery,
    /// A request for a banking service that results in a ticket.
    #[serde(rename = "service")]
    Service,
    /// A navigation request inside the banking app.
    #[serde(rename = "page_routing")]
    PageRouting,
    /// Conversation that needs no system data.
    #[serde(rename = "general")]
    General,
}

impl IntentLabel {
    /// All labels, in prompt order.
    pub const ALL: [IntentLabel; 4] = [
        IntentLabel::DbQuery,
        IntentLabel::Service,
        IntentLabel::PageRouting,
        IntentLabel::General,
    ];

    /// Returns the canonical wire label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DbQuery => "dbquery",
            Self::Service => "service",
            Self::PageRouting => "page_routing",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for IntentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown intent label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown intent label: {0}")]
pub struct ParseIntentError(pub String);

impl std::str::FromStr for IntentLabel {
    type Err = ParseIntentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dbquery" => Ok(Self::DbQuery),
            "service" => Ok(Self::Service),
            "page_routing" => Ok(Self::PageRouting),
            "general" => Ok(Self::General),
            _ => Err(ParseIntentError(s.to_string())),
        }
    }
}

/// Details about an utterance consulted by the authentication policy.
///
/// `query_type` is an optional sub-classification (for example
/// `branch_locations` or `settings`) that can override an intent's default
/// authentication requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDetails {
    /// The raw utterance text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Optional sub-classification of the query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
}

impl QueryDetails {
    /// Details carrying only the raw utterance.
    pub fn from_query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            query_type: None,
        }
    }

    /// Sets the sub-classification.
    pub fn with_query_type(mut self, query_type: impl Into<String>) -> Self {
        self.query_type = Some(query_type.into());
        self
    }
}
