// Queue store factory

use crate::settings::{ServiceSettings, StorageBackend};
use scoreq_core::port::{QueueStore, TimeProvider};
use scoreq_core::Result;
use scoreq_infra_file::JsonFileQueueStore;
use scoreq_infra_sqlite::SqliteQueueStore;
use std::sync::Arc;
use tracing::info;

/// Open the configured backend at `settings.storage_path`
pub async fn open_store(
    settings: &ServiceSettings,
    time_provider: Arc<dyn TimeProvider>,
) -> Result<Arc<dyn QueueStore>> {
    let config = settings.store_config();
    info!(
        backend = %settings.storage_backend,
        path = %config.storage_path.display(),
        capacity = config.max_messages_per_queue,
        "Opening queue store"
    );

    let store: Arc<dyn QueueStore> = match settings.storage_backend {
        StorageBackend::Json => Arc::new(JsonFileQueueStore::new(&config, time_provider)),
        StorageBackend::Sqlite => Arc::new(SqliteQueueStore::open(&config, time_provider).await?),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoreq_core::domain::Message;
    use scoreq_core::port::time_provider::SystemTimeProvider;

    #[tokio::test]
    async fn test_both_backends_open_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        for (backend, file) in [
            (StorageBackend::Json, "queues.json"),
            (StorageBackend::Sqlite, "queues.db"),
        ] {
            let settings = ServiceSettings {
                storage_backend: backend,
                storage_path: dir.path().join(file).display().to_string(),
                max_messages_per_queue: 2,
                ..Default::default()
            };
            let store = open_store(&settings, Arc::new(SystemTimeProvider)).await.unwrap();
            assert_eq!(store.capacity(), 2);

            store.create("transactions").await.unwrap();
            store
                .push("transactions", Message::features(&[0.1]))
                .await
                .unwrap();
            let msg = store.pull("transactions").await.unwrap();
            assert!(msg.queued_at().is_some(), "{backend} did not stamp");
        }
    }
}
