//! Shared fixtures for the integration tests
#![allow(dead_code)]

use scoreq_core::application::QueueClient;
use scoreq_core::port::time_provider::SystemTimeProvider;
use scoreq_core::port::QueueStore;
use scoreq_service::{open_store, ServiceSettings, StorageBackend};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const BACKENDS: [StorageBackend; 2] = [StorageBackend::Json, StorageBackend::Sqlite];

pub fn settings(backend: StorageBackend, dir: &Path, capacity: usize) -> ServiceSettings {
    let file = match backend {
        StorageBackend::Json => "queues.json",
        StorageBackend::Sqlite => "queues.db",
    };
    ServiceSettings {
        storage_backend: backend,
        storage_path: dir.join(file).display().to_string(),
        max_messages_per_queue: capacity,
        model_path: dir.join("fraud_model.json").display().to_string(),
        poll_interval_ms: 10,
        ..Default::default()
    }
}

pub async fn open(backend: StorageBackend, dir: &Path, capacity: usize) -> Arc<dyn QueueStore> {
    open_store(&settings(backend, dir, capacity), Arc::new(SystemTimeProvider))
        .await
        .unwrap()
}

pub async fn client(backend: StorageBackend, dir: &Path, capacity: usize) -> QueueClient {
    QueueClient::new(open(backend, dir, capacity).await)
}

/// Write a model artifact next to the store and return its path
pub fn write_model(dir: &Path, artifact: serde_json::Value) -> PathBuf {
    let path = dir.join("fraud_model.json");
    std::fs::write(&path, artifact.to_string()).unwrap();
    path
}
