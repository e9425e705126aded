use std::sync::Arc;

use async_trait::async_trait;
use vyom_db::{run_select, DbPool, QueryRows};

use crate::error::CollaboratorError;
use crate::model::{ChatMessage, ChatModel};

pub const DEFAULT_SCHEMA_DESCRIPTION: &str = "\
The database has a table named 'customer' with the following columns:
- cust_id (text, primary key): Unique identifier for each customer
- custname (text): The customer's name
- email (text): The customer's email address
- phone_no (text): The customer's phone number
- bank_balance (real): The customer's bank balance
- cred_score (integer): The customer's credit score
- dob (text, ISO date): The customer's date of birth
- branch_id (integer): The branch ID the customer is associated with
- join_date (text, ISO timestamp): When the customer joined";

/// Natural language to SQL.
#[async_trait]
pub trait QueryTranslator: Send + Sync {
    async fn translate(&self, question: &str, user_id: &str) -> Result<String, CollaboratorError>;
}

/// Executes a read-only query.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<QueryRows, CollaboratorError>;
}

pub struct LlmQueryTranslator {
    model: Arc<dyn ChatModel>,
    schema_description: String,
}

impl LlmQueryTranslator {
    pub fn new(model: Arc<dyn ChatModel>, schema_description: impl Into<String>) -> Self {
        Self {
            model,
            schema_description: schema_description.into(),
        }
    }

    fn prompt(&self, user_id: &str) -> String {
        format!(
            "You are an expert in converting English questions to SQLite queries.\n\n\
             {}\n\n\
             username: {}\n\n\
             Given the user question, generate ONLY a single valid read-only SQLite SELECT query \
             restricted to this user's rows.\n\
             Do not include any explanations, markdown formatting, or backticks.\n\
             Return just the raw query that can be executed directly.",
            self.schema_description, user_id
        )
    }
}

#[async_trait]
impl QueryTranslator for LlmQueryTranslator {
    async fn translate(&self, question: &str, user_id: &str) -> Result<String, CollaboratorError> {
        let reply = self
            .model
            .complete(vec![
                ChatMessage::system(self.prompt(user_id)),
                ChatMessage::user(question),
            ])
            .await?;
        let sql = strip_code_fence(&reply);
        tracing::debug!(user_id = %user_id, sql = %sql, "translated question to SQL");
        Ok(sql)
    }
}

/// Removes a surrounding markdown code fence, if the model added one anyway.
fn strip_code_fence(reply: &str) -> String {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    let inner = match inner.split_once('\n') {
        Some((lang, rest)) if !lang.trim().contains(' ') => rest,
        _ => inner,
    };
    inner.trim().to_string()
}

/// Runs queries against the read-only SQLite pool on the blocking thread pool.
#[derive(Clone)]
pub struct SqliteQueryExecutor {
    pool: DbPool,
    max_rows: usize,
}

impl SqliteQueryExecutor {
    pub fn new(pool: DbPool, max_rows: usize) -> Self {
        Self { pool, max_rows }
    }
}

#[async_trait]
impl QueryExecutor for SqliteQueryExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryRows, CollaboratorError> {
        let pool = self.pool.clone();
        let sql = sql.to_string();
        let max_rows = self.max_rows;
        tokio::task::spawn_blocking(move || run_select(&pool, &sql, max_rows))
            .await
            .map_err(|e| CollaboratorError::Task(e.to_string()))?
            .map_err(CollaboratorError::from)
    }
}

/// Used when no database is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredQueryExecutor;

#[async_trait]
impl QueryExecutor for UnconfiguredQueryExecutor {
    async fn execute(&self, _sql: &str) -> Result<QueryRows, CollaboratorError> {
        Err(CollaboratorError::NotConfigured("customer database"))
    }
}
