//! Understanding and fulfilling user utterances.
//!
//! An utterance is classified into an [`IntentLabel`](vyom_types::IntentLabel),
//! checked against the [`AuthPolicy`], dispatched to the matching handler in
//! [`IntentHandlers`] and finally narrated back to the user by the
//! [`Narrator`]. Every external system (chat model, SQL database, ticket
//! system) sits behind an `async_trait` seam so the orchestrator can be
//! exercised with in-process fakes.

pub mod classifier;
pub mod error;
pub mod handlers;
pub mod model;
pub mod narrator;
pub mod policy;
pub mod query_type;

pub use classifier::{IntentClassifier, LlmIntentClassifier};
pub use error::CollaboratorError;
pub use handlers::{HandlerRequest, IntentHandlers, IntentOutcome};
pub use model::{ChatMessage, ChatModel, ChatModelSettings, OpenAiChatModel, Role};
pub use narrator::{Narrator, DEFAULT_HISTORY_TURNS, FALLBACK_REPLY};
pub use policy::{AuthPolicy, IntentRule};
pub use query_type::resolve_query_type;
