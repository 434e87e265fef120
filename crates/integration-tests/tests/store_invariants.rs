//! Queue store invariants, checked against both backends

mod common;

use common::{open, settings, BACKENDS};
use scoreq_core::domain::{Message, QueueError, QueueInfo};
use scoreq_service::StorageBackend;
use serde_json::json;
use std::collections::HashSet;

#[tokio::test]
async fn test_capacity_invariant() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let store = open(backend, dir.path(), 3).await;
        store.create("transactions").await.unwrap();

        for i in 0..3 {
            store
                .push("transactions", Message::features(&[i as f64]))
                .await
                .unwrap();
        }
        let err = store
            .push("transactions", Message::features(&[99.0]))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            QueueError::Full {
                queue: "transactions".to_string(),
                capacity: 3
            },
            "{backend}"
        );
        assert_eq!(store.len("transactions").await.unwrap(), 3);

        // The rejected push left no trace
        for i in 0..3 {
            let msg = store.pull("transactions").await.unwrap();
            assert_eq!(msg.extract_features().unwrap(), vec![i as f64]);
        }
        assert!(store.pull("transactions").await.unwrap_err().is_empty());
    }
}

#[tokio::test]
async fn test_fifo_survives_reopen() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(backend, dir.path(), 100).await;
            store.create("transactions").await.unwrap();
            for i in 0..10 {
                store
                    .push("transactions", Message::new(json!({"features": [i], "seq": i})))
                    .await
                    .unwrap();
            }
        }

        let store = open(backend, dir.path(), 100).await;
        for i in 0..10 {
            let msg = store.pull("transactions").await.unwrap();
            assert_eq!(msg.payload()["seq"], json!(i), "{backend}");
        }
    }
}

#[tokio::test]
async fn test_existence_invariant() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let store = open(backend, dir.path(), 100).await;
        let missing = QueueError::NotFound("results".to_string());

        assert_eq!(store.pull("results").await.unwrap_err(), missing);
        assert_eq!(
            store.push("results", Message::prediction(1)).await.unwrap_err(),
            missing
        );
        assert_eq!(store.delete("results").await.unwrap_err(), missing);
        assert!(store.list().await.unwrap().is_empty());

        store.create("results").await.unwrap();
        store.push("results", Message::prediction(1)).await.unwrap();
        assert_eq!(
            store.create("results").await.unwrap_err(),
            QueueError::AlreadyExists("results".to_string())
        );
        // A failed create does not reset the queue
        assert_eq!(
            store.list().await.unwrap(),
            vec![QueueInfo {
                name: "results".to_string(),
                len: 1
            }]
        );

        store.delete("results").await.unwrap();
        assert_eq!(store.pull("results").await.unwrap_err(), missing);
    }
}

#[tokio::test]
async fn test_corrupt_snapshot_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(StorageBackend::Json, dir.path(), 100).await;
    store.create("transactions").await.unwrap();

    let path = settings(StorageBackend::Json, dir.path(), 100).storage_path;
    std::fs::write(&path, "{ this is not json").unwrap();

    assert!(store.list().await.unwrap().is_empty());
    store.create("transactions").await.unwrap();
    store.create("results").await.unwrap();
    assert_eq!(store.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_two_instances_share_capacity() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let a = open(backend, dir.path(), 10).await;
        let b = open(backend, dir.path(), 10).await;
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
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => accepted += 1,
                Err(e) => assert!(e.is_full(), "{backend}: {e}"),
            }
        }
        assert_eq!(accepted, 10, "{backend}");
        assert_eq!(a.len("transactions").await.unwrap(), 10);
    }
}

#[tokio::test]
async fn test_two_instances_never_pull_the_same_message() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let a = open(backend, dir.path(), 100).await;
        let b = open(backend, dir.path(), 100).await;
        a.create("transactions").await.unwrap();
        for i in 0..20 {
            a.push("transactions", Message::new(json!({"features": [i], "seq": i})))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..40 {
            let store = if i % 2 == 0 { a.clone() } else { b.clone() };
            handles.push(tokio::spawn(async move { store.pull("transactions").await }));
        }

        let mut seen = HashSet::new();
        let mut empty = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(msg) => assert!(seen.insert(msg.payload()["seq"].as_i64().unwrap())),
                Err(e) => {
                    assert!(e.is_empty(), "{backend}: {e}");
                    empty += 1;
                }
            }
        }
        assert_eq!(seen.len(), 20, "{backend}");
        assert_eq!(empty, 20);
    }
}
