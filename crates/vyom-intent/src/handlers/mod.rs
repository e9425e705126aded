//! Intent handlers and the collaborators they call.

mod dbquery;
mod page;
mod service;

use std::sync::Arc;

use serde::Serialize;
use vyom_types::{IntentLabel, QueryDetails};

pub use dbquery::{
    LlmQueryTranslator, QueryExecutor, QueryTranslator, SqliteQueryExecutor,
    UnconfiguredQueryExecutor, DEFAULT_SCHEMA_DESCRIPTION,
};
pub use page::{KeywordPageRouter, PageRoute, PageRouter};
pub use service::{
    HttpTicketSystem, LlmServiceClassifier, ServiceClassifier, TicketSystem,
    UnconfiguredTicketSystem, BANKING_SERVICES, GENERAL_SUPPORT_SERVICE,
};

use crate::error::CollaboratorError;
use crate::model::ChatModel;

/// Input to an intent handler.
#[derive(Debug, Clone, Copy)]
pub struct HandlerRequest<'a> {
    /// Customer the request is made for.
    pub user_id: &'a str,
    /// The utterance being answered.
    pub utterance: &'a str,
    pub details: &'a QueryDetails,
}

impl HandlerRequest<'_> {
    /// The question to act on: the recorded query if any, else the utterance.
    pub fn question(&self) -> &str {
        self.details.query.as_deref().unwrap_or(self.utterance)
    }
}

/// What a handler produced. Passed to the narrator as system information.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IntentOutcome {
    DbQuery {
        query: String,
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
        truncated: bool,
    },
    Service {
        service: String,
        ticket_id: String,
    },
    PageRouting {
        target_page: String,
        message: String,
    },
    General {
        message: String,
    },
    Failed {
        intent: IntentLabel,
        error: String,
    },
}

impl IntentOutcome {
    pub fn general() -> Self {
        Self::General {
            message: "This is a general banking query that doesn't require system data.".into(),
        }
    }

    pub fn intent(&self) -> IntentLabel {
        match self {
            Self::DbQuery { .. } => IntentLabel::DbQuery,
            Self::Service { .. } => IntentLabel::Service,
            Self::PageRouting { .. } => IntentLabel::PageRouting,
            Self::General { .. } => IntentLabel::General,
            Self::Failed { intent, .. } => *intent,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Serialized form handed to the narrator.
    pub fn to_system_info(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

/// The collaborators behind every intent.
pub struct IntentHandlers {
    translator: Arc<dyn QueryTranslator>,
    executor: Arc<dyn QueryExecutor>,
    services: Arc<dyn ServiceClassifier>,
    tickets: Arc<dyn TicketSystem>,
    pages: Arc<dyn PageRouter>,
}

impl IntentHandlers {
    pub fn new(
        translator: Arc<dyn QueryTranslator>,
        executor: Arc<dyn QueryExecutor>,
        services: Arc<dyn ServiceClassifier>,
        tickets: Arc<dyn TicketSystem>,
        pages: Arc<dyn PageRouter>,
    ) -> Self {
        Self {
            translator,
            executor,
            services,
            tickets,
            pages,
        }
    }

    /// Model-backed translation and service classification; keyword page
    /// routing.
    pub fn with_model(
        model: Arc<dyn ChatModel>,
        schema_description: impl Into<String>,
        executor: Arc<dyn QueryExecutor>,
        tickets: Arc<dyn TicketSystem>,
    ) -> Self {
        Self::new(
            Arc::new(LlmQueryTranslator::new(model.clone(), schema_description)),
            executor,
            Arc::new(LlmServiceClassifier::new(model)),
            tickets,
            Arc::new(KeywordPageRouter),
        )
    }

    /// Runs the handler for `intent`. Collaborator failures are returned as
    /// [`IntentOutcome::Failed`], never as an error.
    pub async fn handle(&self, intent: IntentLabel, request: HandlerRequest<'_>) -> IntentOutcome {
        let result = match intent {
            IntentLabel::DbQuery => self.handle_db_query(request).await,
            IntentLabel::Service => self.handle_service(request).await,
            IntentLabel::PageRouting => Ok(self.handle_page_routing(request)),
            IntentLabel::General => Ok(IntentOutcome::general()),
        };

        result.unwrap_or_else(|e| {
            tracing::warn!(intent = %intent, user_id = %request.user_id, "intent handler failed: {}", e);
            IntentOutcome::Failed {
                intent,
                error: e.to_string(),
            }
        })
    }

    async fn handle_db_query(&self, request: HandlerRequest<'_>) -> Result<IntentOutcome, CollaboratorError> {
        let query = self
            .translator
            .translate(request.question(), request.user_id)
            .await?;
        let rows = self.executor.execute(&query).await?;
        Ok(IntentOutcome::DbQuery {
            query,
            columns: rows.columns,
            rows: rows.rows,
            truncated: rows.truncated,
        })
    }

    async fn handle_service(&self, request: HandlerRequest<'_>) -> Result<IntentOutcome, CollaboratorError> {
        let service = self.services.identify(request.question()).await?;
        let ticket_id = self
            .tickets
            .submit(request.user_id, request.question())
            .await?;
        tracing::info!(user_id = %request.user_id, service = %service, ticket_id = %ticket_id, "service ticket created");
        Ok(IntentOutcome::Service { service, ticket_id })
    }

    fn handle_page_routing(&self, request: HandlerRequest<'_>) -> IntentOutcome {
        let route = self.pages.route(request.question());
        IntentOutcome::PageRouting {
            message: route.message(),
            target_page: route.target_page,
        }
    }
}
