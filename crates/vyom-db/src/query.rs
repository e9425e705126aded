use rusqlite::types::ValueRef;
use serde::Serialize;
use thiserror::Error;

use crate::pool::DbPool;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("statement rejected: {0}")]
    Rejected(String),

    #[error("failed to get a database connection: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Rows returned by a read-only query, values converted to JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    /// True when more rows matched than `max_rows`.
    pub truncated: bool,
}

/// Runs one `SELECT`/`WITH` statement and collects at most `max_rows` rows.
pub fn run_select(pool: &DbPool, sql: &str, max_rows: usize) -> Result<QueryRows, QueryError> {
    let sql = guard_statement(sql)?;
    let conn = pool.get()?;
    let mut stmt = conn.prepare(sql)?;
    if !stmt.readonly() {
        return Err(QueryError::Rejected("statement is not read-only".into()));
    }

    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let mut out = QueryRows {
        columns,
        ..QueryRows::default()
    };

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        if out.rows.len() == max_rows {
            out.truncated = true;
            break;
        }
        let mut values = Vec::with_capacity(out.columns.len());
        for idx in 0..out.columns.len() {
            values.push(to_json(row.get_ref(idx)?));
        }
        out.rows.push(values);
    }

    tracing::debug!(rows = out.rows.len(), truncated = out.truncated, "query executed");
    Ok(out)
}

/// Strips a trailing semicolon and checks the statement is a single query.
fn guard_statement(sql: &str) -> Result<&str, QueryError> {
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    if trimmed.is_empty() {
        return Err(QueryError::Rejected("empty statement".into()));
    }
    if trimmed.contains(';') {
        return Err(QueryError::Rejected("multiple statements".into()));
    }

    let keyword = trimmed
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if keyword != "select" && keyword != "with" {
        return Err(QueryError::Rejected(format!(
            "only SELECT or WITH queries are allowed, got {}",
            keyword.to_uppercase()
        )));
    }
    Ok(trimmed)
}

fn to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => i.into(),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned().into(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()).into(),
    }
}
