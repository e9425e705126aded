//! Builds the external collaborators from configuration.

use std::sync::Arc;
use std::time::Duration;

use vyom_db::{create_pool, DbRuntimeSettings};
use vyom_intent::handlers::{
    HttpTicketSystem, QueryExecutor, SqliteQueryExecutor, TicketSystem, UnconfiguredQueryExecutor,
    UnconfiguredTicketSystem, DEFAULT_SCHEMA_DESCRIPTION,
};
use vyom_intent::{
    AuthPolicy, ChatModel, IntentClassifier, IntentHandlers, LlmIntentClassifier, Narrator,
    OpenAiChatModel,
};

use crate::config::Config;

/// Everything the orchestrator calls out to.
pub struct Collaborators {
    pub classifier: Arc<dyn IntentClassifier>,
    pub policy: AuthPolicy,
    pub handlers: IntentHandlers,
    pub narrator: Narrator,
}

impl Collaborators {
    /// Builds one chat model shared by the classifier, handlers and
    /// narrator. A missing database or ticket URL leaves that collaborator
    /// unconfigured; intents that need it report a failed result.
    pub fn from_config(config: &Config) -> Self {
        if config.llm.api_key.is_none() {
            tracing::warn!("llm.api_key is not set; chat-model calls will be unauthenticated");
        }
        let model: Arc<dyn ChatModel> =
            Arc::new(OpenAiChatModel::new(config.llm.model_settings()));

        Self::with_model(config, model)
    }

    /// Like [`Collaborators::from_config`] with a caller-supplied model.
    pub fn with_model(config: &Config, model: Arc<dyn ChatModel>) -> Self {
        let schema = config
            .database
            .schema_description
            .clone()
            .unwrap_or_else(|| DEFAULT_SCHEMA_DESCRIPTION.to_string());

        Self {
            classifier: Arc::new(LlmIntentClassifier::new(model.clone())),
            policy: AuthPolicy::banking(),
            handlers: IntentHandlers::with_model(
                model.clone(),
                schema,
                query_executor(config),
                ticket_system(config),
            ),
            narrator: Narrator::new(model, config.llm.history_turns),
        }
    }
}

fn query_executor(config: &Config) -> Arc<dyn QueryExecutor> {
    let Some(path) = config.database.path.as_deref() else {
        tracing::info!("database.path not set; data queries are disabled");
        return Arc::new(UnconfiguredQueryExecutor);
    };

    let settings = DbRuntimeSettings {
        busy_timeout_ms: config.database.busy_timeout_ms,
        pool_max_size: config.database.pool_max_size,
    };
    match create_pool(path, settings) {
        Ok(pool) => {
            tracing::info!(path = %path, "opened read-only customer database");
            Arc::new(SqliteQueryExecutor::new(pool, config.database.max_rows))
        }
        Err(e) => {
            tracing::error!(path = %path, "failed to open customer database, data queries are disabled: {}", e);
            Arc::new(UnconfiguredQueryExecutor)
        }
    }
}

fn ticket_system(config: &Config) -> Arc<dyn TicketSystem> {
    match config.tickets.url.as_deref() {
        Some(url) => Arc::new(HttpTicketSystem::new(
            url,
            Duration::from_secs(config.tickets.timeout_secs),
        )),
        None => {
            tracing::info!("tickets.url not set; service requests are disabled");
            Arc::new(UnconfiguredTicketSystem)
        }
    }
}
