//! Which intents need an authenticated session.

use std::collections::HashMap;

use vyom_types::{IntentLabel, QueryDetails};

/// Authentication rule for one intent.
///
/// `exceptions` flip the default; `requires_auth` force authentication
/// regardless of the default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntentRule {
    pub default: bool,
    pub exceptions: Vec<String>,
    pub requires_auth: Vec<String>,
}

impl IntentRule {
    pub fn new(default: bool) -> Self {
        Self {
            default,
            ..Self::default()
        }
    }

    pub fn with_exceptions(mut self, query_types: &[&str]) -> Self {
        self.exceptions = query_types.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_requires_auth(mut self, query_types: &[&str]) -> Self {
        self.requires_auth = query_types.iter().map(|s| s.to_string()).collect();
        self
    }

    fn evaluate(&self, query_type: Option<&str>) -> bool {
        if let Some(query_type) = query_type {
            if self.exceptions.iter().any(|q| q == query_type) {
                return !self.default;
            }
            if self.requires_auth.iter().any(|q| q == query_type) {
                return true;
            }
        }
        self.default
    }
}

/// Static rule table mapping intents to authentication requirements.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    rules: HashMap<IntentLabel, IntentRule>,
}

impl AuthPolicy {
    /// An empty table; every intent is open.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// The banking assistant's rules: customer data and services need
    /// authentication except for public information; navigation only for
    /// private sections.
    pub fn banking() -> Self {
        Self::empty()
            .with_rule(
                IntentLabel::DbQuery,
                IntentRule::new(true).with_exceptions(&[
                    "bank_info",
                    "branch_locations",
                    "bank_hours",
                ]),
            )
            .with_rule(
                IntentLabel::Service,
                IntentRule::new(true).with_exceptions(&["faq", "contact_info", "new_account_info"]),
            )
            .with_rule(
                IntentLabel::PageRouting,
                IntentRule::new(false).with_requires_auth(&[
                    "account_details",
                    "transaction_history",
                    "settings",
                ]),
            )
            .with_rule(IntentLabel::General, IntentRule::new(false))
    }

    pub fn with_rule(mut self, intent: IntentLabel, rule: IntentRule) -> Self {
        self.rules.insert(intent, rule);
        self
    }

    pub fn rule(&self, intent: IntentLabel) -> Option<&IntentRule> {
        self.rules.get(&intent)
    }

    /// Intents without a rule never require authentication.
    pub fn requires_authentication(&self, intent: IntentLabel, details: Option<&QueryDetails>) -> bool {
        let query_type = details.and_then(|d| d.query_type.as_deref());
        self.rules
            .get(&intent)
            .is_some_and(|rule| rule.evaluate(query_type))
    }

    /// As [`requires_authentication`](Self::requires_authentication), for a
    /// raw label. Unknown labels never require authentication.
    pub fn requires_authentication_for(&self, intent: &str, details: Option<&QueryDetails>) -> bool {
        intent
            .parse::<IntentLabel>()
            .is_ok_and(|label| self.requires_authentication(label, details))
    }
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self::banking()
    }
}
