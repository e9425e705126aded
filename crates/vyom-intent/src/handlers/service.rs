use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::model::{ChatMessage, ChatModel};

const TICKET_SERVICE: &str = "ticket system";

/// The bank's service catalogue.
pub const BANKING_SERVICES: &[&str] = &[
    "new_credit_card",
    "email_update",
    "phone_update",
    "address_update",
    "account_closure",
    "debit_card_replacement",
    "loan_application",
    "transaction_dispute",
    "balance_inquiry",
    "statement_request",
    GENERAL_SUPPORT_SERVICE,
];

pub const GENERAL_SUPPORT_SERVICE: &str = "general_banking_support";

const SERVICE_PROMPT: &str = "\
You are an AI assistant specializing in banking service requests.
Your task is to classify user queries into predefined banking service categories.
Based on the user's request, identify the most relevant service.

Available Banking Services:
- New Credit Card: Apply for a new credit card.
- Email Update: Change or update email address linked to bank account.
- Phone Update: Modify or change registered phone number.
- Address Update: Update residential or mailing address.
- Account Closure: Request to close a bank account.
- Debit Card Replacement: Request a new debit/ATM card.
- Loan Application: Apply for personal, home, or car loans.
- Transaction Dispute: Report unauthorized transactions or request refunds.
- Balance Inquiry: Ask about available funds or account balance.
- Statement Request: Request bank statements.
- General Banking Support: Any other banking-related inquiries.

Examples:
- \"I want to apply for a credit card.\" -> new_credit_card
- \"I lost my debit card, need a replacement.\" -> debit_card_replacement
- \"How do I change my registered mobile number?\" -> phone_update
- \"Please help me close my bank account.\" -> account_closure
- \"There is an unauthorized charge on my account!\" -> transaction_dispute

Respond with ONLY the service name in lowercase (e.g., 'new_credit_card', 'email_update').
If unclear, return 'general_banking_support'.";

/// Maps a request onto one entry of [`BANKING_SERVICES`].
#[async_trait]
pub trait ServiceClassifier: Send + Sync {
    async fn identify(&self, query: &str) -> Result<String, CollaboratorError>;
}

/// Submits a service request and returns the ticket id.
///
/// Implementations must not retry: a retried submission can open a
/// duplicate ticket.
#[async_trait]
pub trait TicketSystem: Send + Sync {
    async fn submit(&self, user_id: &str, query: &str) -> Result<String, CollaboratorError>;
}

pub struct LlmServiceClassifier {
    model: Arc<dyn ChatModel>,
}

impl LlmServiceClassifier {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ServiceClassifier for LlmServiceClassifier {
    async fn identify(&self, query: &str) -> Result<String, CollaboratorError> {
        let reply = self
            .model
            .complete(vec![ChatMessage::system(SERVICE_PROMPT), ChatMessage::user(query)])
            .await?;
        Ok(catalogue_entry(&reply).to_string())
    }
}

fn catalogue_entry(raw: &str) -> &'static str {
    let normalized = raw.trim().trim_matches(&['\'', '"'][..]).to_lowercase();
    BANKING_SERVICES
        .iter()
        .copied()
        .find(|service| *service == normalized)
        .unwrap_or(GENERAL_SUPPORT_SERVICE)
}

#[derive(Debug, Serialize)]
struct TicketRequest<'a> {
    user_id: &'a str,
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct TicketResponse {
    #[serde(default)]
    query_id: Option<serde_json::Value>,
}

/// Ticket system reached over HTTP: `POST {user_id, query}` → `{query_id}`.
#[derive(Debug, Clone)]
pub struct HttpTicketSystem {
    client: Client,
    url: String,
}

impl HttpTicketSystem {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl TicketSystem for HttpTicketSystem {
    async fn submit(&self, user_id: &str, query: &str) -> Result<String, CollaboratorError> {
        let response = self
            .client
            .post(&self.url)
            .json(&TicketRequest { user_id, query })
            .send()
            .await
            .map_err(|e| CollaboratorError::Request {
                service: TICKET_SERVICE,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Status {
                service: TICKET_SERVICE,
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: TicketResponse =
            response
                .json()
                .await
                .map_err(|e| CollaboratorError::InvalidResponse {
                    service: TICKET_SERVICE,
                    message: e.to_string(),
                })?;
        ticket_id(body)
    }
}

fn ticket_id(body: TicketResponse) -> Result<String, CollaboratorError> {
    match body.query_id {
        Some(serde_json::Value::String(id)) if !id.is_empty() => Ok(id),
        Some(serde_json::Value::Number(id)) => Ok(id.to_string()),
        _ => Err(CollaboratorError::InvalidResponse {
            service: TICKET_SERVICE,
            message: "response carried no query_id".into(),
        }),
    }
}

/// Used when no ticket system URL is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredTicketSystem;

#[async_trait]
impl TicketSystem for UnconfiguredTicketSystem {
    async fn submit(&self, _user_id: &str, _query: &str) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::NotConfigured(TICKET_SERVICE))
    }
}
