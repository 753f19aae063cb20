//! Persistence for Gatehouse.
//!
//! SQLite connection pooling (via `r2d2`) in WAL mode, embedded migrations,
//! a [`SqliteJournal`] that makes engine change sets durable, startup
//! restore, and the records mirror that answers reference lookups.
//!
//! The state tables are a materialized view of the engine's stores: each
//! [`gatehouse_state::StateChange`] maps to one row write, and
//! [`load_state`] turns the rows back into changes on startup.

mod error;
mod journal;
mod migrations;
mod pool;
mod records;
mod restore;

pub use error::DbError;
pub use journal::SqliteJournal;
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
pub use records::{
    get_record, insert_record, mark_withdrawn, SqliteLedger, StoredRecord,
};
pub use restore::{genesis_root, load_state, restore_or_bootstrap, snapshot_changes};
