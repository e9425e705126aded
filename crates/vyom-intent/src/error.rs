use thiserror::Error;

/// Failure of an external collaborator (chat model, database, ticket system).
///
/// Collaborator failures never abort a conversation turn; the orchestrator
/// turns them into a failed intent outcome and narrates it.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("request to {service} failed: {message}")]
    Request { service: &'static str, message: String },

    #[error("{service} returned status {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} returned an unusable response: {message}")]
    InvalidResponse { service: &'static str, message: String },

    #[error(transparent)]
    Query(#[from] vyom_db::QueryError),

    #[error("background task failed: {0}")]
    Task(String),
}
