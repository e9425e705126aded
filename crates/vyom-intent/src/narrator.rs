//! The conversational layer: turns handler results into the assistant's reply.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::model::{ChatMessage, ChatModel};

const PERSONA: &str = "\
You are a friendly and professional banking assistant named BankBuddy. Your job is to help customers with their banking needs.
**Keep your reply short and concise and always maintain a friendly tone.**
When responding to customers:
1. Be warm, professional, and conversational - imagine you're a helpful bank teller
2. Address the customer's specific question directly and concisely
3. Use the information provided by the system - never invent account details or transaction information
4. Provide clear next steps when appropriate
5. Maintain appropriate privacy and security practices - never ask for full account numbers, passwords, or PINs

Important: When system provides data like transaction details or account information, present it in a natural,
conversational way. Incorporate the data seamlessly into your response.";

/// Reply used when the chat model cannot be reached.
pub const FALLBACK_REPLY: &str =
    "I'm sorry, I'm having trouble responding right now. Please try again in a moment.";

pub const DEFAULT_HISTORY_TURNS: usize = 20;

/// Narrates with per-session history bounded to `max_turns` exchanges.
pub struct Narrator {
    model: Arc<dyn ChatModel>,
    history: Mutex<HashMap<String, VecDeque<ChatMessage>>>,
    max_turns: usize,
}

impl Narrator {
    pub fn new(model: Arc<dyn ChatModel>, max_turns: usize) -> Self {
        Self {
            model,
            history: Mutex::new(HashMap::new()),
            max_turns: max_turns.max(1),
        }
    }

    /// Produces the reply to `utterance` given `system_info`.
    ///
    /// Never fails: a model error yields [`FALLBACK_REPLY`], and that
    /// exchange is not recorded in history.
    pub async fn narrate(&self, session_id: &str, utterance: &str, system_info: &str) -> String {
        let mut messages = vec![ChatMessage::system(PERSONA)];
        messages.extend(self.history(session_id));
        messages.push(ChatMessage::system(system_info));
        messages.push(ChatMessage::user(utterance));

        match self.model.complete(messages).await {
            Ok(reply) => {
                self.record(session_id, utterance, &reply);
                reply
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, "narration failed: {}", e);
                FALLBACK_REPLY.to_string()
            }
        }
    }

    pub fn history(&self, session_id: &str) -> Vec<ChatMessage> {
        self.lock()
            .get(session_id)
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops a session's history.
    pub fn forget(&self, session_id: &str) {
        self.lock().remove(session_id);
    }

    fn record(&self, session_id: &str, utterance: &str, reply: &str) {
        let mut history = self.lock();
        let turns = history.entry(session_id.to_string()).or_default();
        turns.push_back(ChatMessage::user(utterance));
        turns.push_back(ChatMessage::assistant(reply));
        while turns.len() > self.max_turns * 2 {
            turns.pop_front();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<ChatMessage>>> {
        self.history.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use async_trait::async_trait;

    /// Replies with the number of messages it received.
    struct Counting;

    #[async_trait]
    impl ChatModel for Counting {
        async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, CollaboratorError> {
            Ok(format!("saw {}", messages.len()))
        }
    }

    struct Down;

    #[async_trait]
    impl ChatModel for Down {
        async fn complete(&self, _messages: Vec<ChatMessage>) -> Result<String, CollaboratorError> {
            Err(CollaboratorError::NotConfigured("chat model"))
        }
    }

    #[tokio::test]
    async fn history_grows_and_is_bounded() {
        let narrator = Narrator::new(Arc::new(Counting), 2);
        assert_eq!(narrator.narrate("s", "hi", "{}").await, "saw 3");
        assert_eq!(narrator.narrate("s", "again", "{}").await, "saw 5");
        assert_eq!(narrator.narrate("s", "more", "{}").await, "saw 7");
        assert_eq!(narrator.narrate("s", "still", "{}").await, "saw 7");

        let history = narrator.history("s");
        assert_eq!(history.len(), 4);
        assert_eq!(history[0], ChatMessage::user("more"));
        assert!(narrator.history("other").is_empty());
    }

    #[tokio::test]
    async fn model_failure_yields_fallback() {
        let narrator = Narrator::new(Arc::new(Down), 5);
        assert_eq!(narrator.narrate("s", "hi", "{}").await, FALLBACK_REPLY);
        assert!(narrator.history("s").is_empty());
    }

    #[tokio::test]
    async fn forget_clears_history() {
        let narrator = Narrator::new(Arc::new(Counting), 5);
        narrator.narrate("s", "hi", "{}").await;
        narrator.forget("s");
        assert!(narrator.history("s").is_empty());
    }
}
