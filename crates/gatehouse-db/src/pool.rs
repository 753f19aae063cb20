//! Connection pool construction.

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

/// SQLite connection tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a connection waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Upper bound on pooled connections.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

/// The shared SQLite pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Errors raised while building the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool could not open its first connections.
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

fn prepare_connection(conn: &mut Connection, settings: DbRuntimeSettings) -> rusqlite::Result<()> {
    // In-memory databases answer "memory" and cannot switch to WAL.
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    if mode != "wal" && mode != "memory" {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!("journal_mode stayed at {mode}, expected wal")),
        ));
    }
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(Duration::from_millis(settings.busy_timeout_ms))
}

/// Creates a pool over the database at `db_path`.
///
/// Every connection runs in WAL mode with foreign keys on. `:memory:` gives
/// each connection its own private database, so tests that share state
/// across connections should use a temporary file instead.
///
/// # Errors
///
/// Returns [`PoolError::PoolInit`] if the initial connections fail to open.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| prepare_connection(conn, settings));

    Ok(Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)?)
}
