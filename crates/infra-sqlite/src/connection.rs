// SQLite Connection Pool Setup

use scoreq_core::domain::QueueError;
use scoreq_core::port::StoreResult;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Create SQLite connection pool with WAL mode and a busy timeout.
///
/// In-memory databases get a single, never-recycled connection so every
/// query sees the same database.
pub async fn create_pool(database_url: &str) -> StoreResult<SqlitePool> {
    let in_memory = database_url.contains(":memory:");

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| QueueError::Storage(format!("invalid database url: {}", e)))?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true)
        .create_if_missing(true);

    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(10)
    };

    pool_options
        .connect_with(options)
        .await
        .map_err(|e| QueueError::Storage(format!("failed to open database: {}", e)))
}
