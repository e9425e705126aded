//! Connection pool creation and configuration.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use thiserror::Error;

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// Busy timeout for SQLite connections, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 4,
        }
    }
}

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("database file not found: {0}")]
    Missing(String),

    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Opens a read-only pool over an existing SQLite file.
///
/// # Errors
///
/// Returns `PoolError::Missing` if `db_path` does not exist and
/// `PoolError::PoolInit` if the first connection cannot be opened.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    if !std::path::Path::new(db_path).exists() {
        return Err(PoolError::Missing(db_path.to_string()));
    }

    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| {
            conn.execute_batch(&format!(
                "PRAGMA query_only = ON;
                 PRAGMA busy_timeout = {};",
                settings.busy_timeout_ms
            ))
        });

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)?;

    tracing::info!(path = %db_path, max_size = settings.pool_max_size, "opened read-only database pool");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_file() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let conn = rusqlite::Connection::open(file.path()).expect("open for seeding");
        conn.execute_batch("CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT);")
            .expect("seed schema");
        file
    }

    #[test]
    fn pool_is_read_only() {
        let file = seeded_file();
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 2_500,
            pool_max_size: 2,
        };
        let pool = create_pool(file.path().to_str().unwrap(), settings).expect("pool");
        let conn = pool.get().expect("connection");

        let query_only: i32 = conn
            .query_row("PRAGMA query_only;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(query_only, 1);

        let busy_timeout: i32 = conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(busy_timeout, 2_500);
        assert_eq!(pool.max_size(), 2);

        assert!(conn
            .execute("INSERT INTO customers (name) VALUES ('mallory')", [])
            .is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");
        let err = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap_err();
        assert!(matches!(err, PoolError::Missing(_)));
    }
}
