//! Intent classification.

use std::sync::Arc;

use async_trait::async_trait;
use vyom_types::IntentLabel;

use crate::error::CollaboratorError;
use crate::model::{ChatMessage, ChatModel};

const INTENT_PROMPT: &str = "\
You are an intent classifier for a banking assistant.
Analyze the user query and classify it into EXACTLY ONE of these categories:

1. dbquery: Any request for user data or information from the database.
   Examples: account balance, transaction history, account details, credit score,
   personal information, statement requests, interest rates on accounts.

2. service: Requests for banking services or actions to be performed.
   Examples: fund transfers, bill payments, card activation/deactivation, loan requests,
   address changes, mobile number updates, setting up auto-pay, reporting issues.

3. page_routing: Navigation requests to different sections of the banking app.
   Examples: \"take me to the transfers page\", \"show me where I can update my profile\",
   \"how do I get to the beneficiary management section\", \"open the investments tab\".

4. general: General questions about banking, products, or conversation that doesn't fit
   the above categories. Examples: greetings, general banking information, product inquiries
   not requiring access to user data, thanks, goodbyes.

Respond with ONLY the category name in lowercase, nothing else.";

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, utterance: &str) -> Result<IntentLabel, CollaboratorError>;
}

/// Classifies with one chat-model call; any reply outside the four labels
/// becomes [`IntentLabel::General`].
pub struct LlmIntentClassifier {
    model: Arc<dyn ChatModel>,
}

impl LlmIntentClassifier {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, utterance: &str) -> Result<IntentLabel, CollaboratorError> {
        let reply = self
            .model
            .complete(vec![
                ChatMessage::system(INTENT_PROMPT),
                ChatMessage::user(utterance),
            ])
            .await?;
        let label = parse_label(&reply);
        tracing::debug!(raw = %reply, intent = %label, "classified utterance");
        Ok(label)
    }
}

fn parse_label(raw: &str) -> IntentLabel {
    raw.trim()
        .to_lowercase()
        .parse()
        .unwrap_or(IntentLabel::General)
}
