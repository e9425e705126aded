//! Keyword sub-classification of an utterance into a policy `query_type`.

/// Phrase → query type, checked in order; the first contained phrase wins.
const QUERY_TYPE_KEYWORDS: &[(&str, &str)] = &[
    ("branch", "branch_locations"),
    ("atm near", "branch_locations"),
    ("opening hours", "bank_hours"),
    ("bank hours", "bank_hours"),
    ("working hours", "bank_hours"),
    ("about the bank", "bank_info"),
    ("bank info", "bank_info"),
    ("faq", "faq"),
    ("frequently asked", "faq"),
    ("contact", "contact_info"),
    ("customer care", "contact_info"),
    ("open a new account", "new_account_info"),
    ("new account", "new_account_info"),
    ("account details", "account_details"),
    ("transaction", "transaction_history"),
    ("settings", "settings"),
];

/// Query types that describe public bank information. The policy lets some
/// of these through without authentication.
const PUBLIC_QUERY_TYPES: &[&str] = &[
    "branch_locations",
    "bank_hours",
    "bank_info",
    "faq",
    "contact_info",
    "new_account_info",
];

/// Phrases that make an utterance about the customer's own data or a change
/// to it. Their presence rules out a public query type.
const PERSONAL_CUES: &[&str] = &[
    "update",
    "change my",
    "modify",
    "edit my",
    "close my",
    "cancel",
    "replace my",
    "block my",
    "dispute",
    "balance",
    "statement",
    "my account",
    "my card",
    "my contact",
    "my number",
    "my phone",
    "my email",
    "my address",
    "my details",
    "my loan",
];

/// Returns the query type implied by `utterance`, if any.
///
/// Public query types are only assigned to utterances without a personal
/// cue, so "update my contact number" gets no query type at all.
pub fn resolve_query_type(utterance: &str) -> Option<&'static str> {
    let lowered = utterance.to_lowercase();
    let personal = PERSONAL_CUES.iter().any(|cue| lowered.contains(cue));
    QUERY_TYPE_KEYWORDS
        .iter()
        .filter(|(_, query_type)| !(personal && PUBLIC_QUERY_TYPES.contains(query_type)))
        .find(|(phrase, _)| lowered.contains(phrase))
        .map(|(_, query_type)| *query_type)
}
