// Migration Runner

use scoreq_core::domain::QueueError;
use scoreq_core::port::StoreResult;
use sqlx::SqlitePool;
use tracing::info;

fn migration_error(err: sqlx::Error) -> QueueError {
    QueueError::Storage(format!("migration failed: {}", err))
}

/// Run database migrations
pub async fn run_migrations(pool: &SqlitePool) -> StoreResult<()> {
    // Check if schema_version table exists
    let table_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
    )
    .fetch_one(pool)
    .await
    .map_err(migration_error)?;

    let current_version: i64 = if table_exists > 0 {
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(migration_error)?
            .unwrap_or(0)
    } else {
        0
    };

    if current_version < 1 {
        info!("Applying migration 001: queues and messages");
        apply_migration(pool, include_str!("../migrations/001_initial_schema.sql")).await?;
    }

    Ok(())
}

/// Apply a single migration SQL file inside one transaction
async fn apply_migration(pool: &SqlitePool, sql: &str) -> StoreResult<()> {
    let mut tx = pool.begin().await.map_err(migration_error)?;

    for statement in sql.split(';') {
        // Remove comments and trim
        let clean_statement: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();

        if !clean_statement.is_empty() {
            sqlx::query(&clean_statement)
                .execute(&mut *tx)
                .await
                .map_err(migration_error)?;
        }
    }

    tx.commit().await.map_err(migration_error)
}
