// SQLite QueueStore Implementation
//
// Push and pull are single statements, so capacity and FIFO hold even with
// several processes writing the same database file.

use crate::{create_pool, run_migrations};
use async_trait::async_trait;
use scoreq_core::domain::{validate_queue_name, Message, QueueError, QueueInfo, StoreConfig};
use scoreq_core::port::{QueueStore, StoreResult, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

// Helper to convert sqlx::Error to QueueError with structured information
fn map_sqlx_error(err: sqlx::Error) -> QueueError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            // SQLITE_BUSY - database is locked
            Some("5") => QueueError::Storage(format!(
                "Database locked (SQLITE_BUSY): {}",
                db_err.message()
            )),
            // SQLITE_FULL - database or disk is full
            Some("13") => QueueError::Storage(format!("Database full: {}", db_err.message())),
            Some(code) => {
                QueueError::Storage(format!("Database error [{}]: {}", code, db_err.message()))
            }
            None => QueueError::Storage(format!("Database error: {}", db_err.message())),
        },
        _ => QueueError::Storage(err.to_string()),
    }
}

pub struct SqliteQueueStore {
    pool: SqlitePool,
    capacity: usize,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteQueueStore {
    pub fn new(pool: SqlitePool, capacity: usize, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            capacity,
            time_provider,
        }
    }

    /// Open (creating if needed) the database at `config.storage_path` and migrate it
    pub async fn open(config: &StoreConfig, time_provider: Arc<dyn TimeProvider>) -> StoreResult<Self> {
        let url = format!("sqlite://{}", config.storage_path.display());
        let pool = create_pool(&url).await?;
        run_migrations(&pool).await?;
        debug!(path = %url, "Opened SQLite queue store");
        Ok(Self::new(pool, config.max_messages_per_queue, time_provider))
    }

    async fn exists(&self, name: &str) -> StoreResult<bool> {
        let found: Option<String> = sqlx::query_scalar("SELECT name FROM queues WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn create(&self, name: &str) -> StoreResult<()> {
        validate_queue_name(name)?;
        let result = sqlx::query(
            "INSERT INTO queues (name, created_at) VALUES (?, ?) ON CONFLICT(name) DO NOTHING",
        )
        .bind(name)
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(QueueError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM messages WHERE queue = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let result = sqlx::query("DELETE FROM queues WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls it back
            return Err(QueueError::NotFound(name.to_string()));
        }
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn push(&self, name: &str, message: Message) -> StoreResult<()> {
        let now = self.time_provider.now_millis();
        let body = serde_json::to_string(
            message
                .stamped(self.time_provider.now_rfc3339())
                .as_value(),
        )
        .map_err(|e| QueueError::Storage(format!("failed to serialize message: {}", e)))?;

        // Conditional insert: no row when the queue is missing or full
        let result = sqlx::query(
            r#"
            INSERT INTO messages (queue, body, queued_at)
            SELECT q.name, ?, ?
            FROM queues q
            WHERE q.name = ?
              AND (SELECT COUNT(*) FROM messages m WHERE m.queue = q.name) < ?
            "#,
        )
        .bind(&body)
        .bind(now)
        .bind(name)
        .bind(self.capacity as i64)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(if self.exists(name).await? {
                QueueError::Full {
                    queue: name.to_string(),
                    capacity: self.capacity,
                }
            } else {
                QueueError::NotFound(name.to_string())
            });
        }
        Ok(())
    }

    async fn pull(&self, name: &str) -> StoreResult<Message> {
        let body: Option<String> = sqlx::query_scalar(
            r#"
            DELETE FROM messages
            WHERE id = (
                SELECT id FROM messages
                WHERE queue = ?
                ORDER BY id ASC
                LIMIT 1
            )
            RETURNING body
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match body {
            Some(body) => {
                let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
                    QueueError::Storage(format!("corrupt message body in '{}': {}", name, e))
                })?;
                Ok(Message::new(value))
            }
            None if self.exists(name).await? => Err(QueueError::Empty(name.to_string())),
            None => Err(QueueError::NotFound(name.to_string())),
        }
    }

    async fn len(&self, name: &str) -> StoreResult<usize> {
        let len: Option<i64> = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM messages m WHERE m.queue = q.name) FROM queues q WHERE q.name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        len.map(|n| n as usize)
            .ok_or_else(|| QueueError::NotFound(name.to_string()))
    }

    async fn list(&self) -> StoreResult<Vec<QueueInfo>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT q.name, COUNT(m.id)
            FROM queues q
            LEFT JOIN messages m ON m.queue = q.name
            GROUP BY q.name
            ORDER BY q.name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|(name, len)| QueueInfo {
                name,
                len: len as usize,
            })
            .collect())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoreq_core::port::time_provider::mocks::FixedTimeProvider;
    use serde_json::json;

    async fn memory_store(capacity: usize) -> SqliteQueueStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteQueueStore::new(pool, capacity, Arc::new(FixedTimeProvider::new(0)))
    }

    #[tokio::test]
    async fn test_fifo_with_stamp() {
        let store = memory_store(100).await;
        store.create("transactions").await.unwrap();

        for i in 0..5 {
            store
                .push("transactions", Message::new(json!({"features": [i]})))
                .await
                .unwrap();
        }
        for i in 0..5 {
            let msg = store.pull("transactions").await.unwrap();
            assert_eq!(msg.payload(), json!({"features": [i]}));
            assert_eq!(msg.queued_at(), Some("1970-01-01T00:00:00.000Z"));
        }
        assert_eq!(
            store.pull("transactions").await.unwrap_err(),
            QueueError::Empty("transactions".to_string())
        );
    }

    #[tokio::test]
    async fn test_existence_and_capacity() {
        let store = memory_store(1).await;

        assert_eq!(
            store.push("results", Message::prediction(1)).await.unwrap_err(),
            QueueError::NotFound("results".to_string())
        );
        assert_eq!(
            store.pull("results").await.unwrap_err(),
            QueueError::NotFound("results".to_string())
        );
        assert_eq!(
            store.delete("results").await.unwrap_err(),
            QueueError::NotFound("results".to_string())
        );

        store.create("results").await.unwrap();
        assert_eq!(
            store.create("results").await.unwrap_err(),
            QueueError::AlreadyExists("results".to_string())
        );

        store.push("results", Message::prediction(1)).await.unwrap();
        assert!(store
            .push("results", Message::prediction(0))
            .await
            .unwrap_err()
            .is_full());
        assert_eq!(store.len("results").await.unwrap(), 1);

        store.delete("results").await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_sorted_with_lengths() {
        let store = memory_store(10).await;
        store.create("transactions").await.unwrap();
        store.create("results").await.unwrap();
        store.push("results", Message::prediction(1)).await.unwrap();

        let infos = store.list().await.unwrap();
        assert_eq!(
            infos,
            vec![
                QueueInfo { name: "results".to_string(), len: 1 },
                QueueInfo { name: "transactions".to_string(), len: 0 },
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_pushes_respect_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(10, dir.path().join("queues.db"));
        let a = Arc::new(
            SqliteQueueStore::open(&config, Arc::new(FixedTimeProvider::new(0)))
                .await
                .unwrap(),
        );
        let b = Arc::new(
            SqliteQueueStore::open(&config, Arc::new(FixedTimeProvider::new(0)))
                .await
                .unwrap(),
        );
        a.create("transactions").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..30 {
            let store = if i % 2 == 0 { a.clone() } else { b.clone() };
            handles.push(tokio::spawn(async move {
                store
                    .push("transactions", Message::features(&[i as f64]))
                    .await
            }));
        }

        let mut accepted = 0;
        let mut full = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => accepted += 1,
                Err(e) if e.is_full() => full += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(accepted, 10);
        assert_eq!(full, 20);
        assert_eq!(b.len("transactions").await.unwrap(), 10);
    }
}
