//! Read-only access to the customer banking database.
//!
//! The assistant never writes to this database. Connections are opened
//! read-only with `query_only` set, and [`run_select`] only accepts a single
//! `SELECT` or `WITH` statement, so model-generated SQL cannot mutate data
//! even if the statement guard were bypassed.

mod pool;
mod query;

pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
pub use query::{run_select, QueryError, QueryRows};
