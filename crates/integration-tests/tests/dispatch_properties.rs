//! Dispatch properties over the real channel transport

mod common;

use common::client;
use scoreq_core::application::{
    shutdown_channel, DispatchConfig, DispatchManager, QueueClient, Worker, WorkerSummary,
};
use scoreq_core::domain::{Label, Message, ScoringError};
use scoreq_core::port::id_provider::UuidProvider;
use scoreq_core::port::scorer::mocks::ConstantScorer;
use scoreq_core::port::{ModelState, Scorer};
use scoreq_core::Result;
use scoreq_infra_system::{channel_group, ChannelManagerTransport};
use scoreq_service::StorageBackend;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Sleeps `features[0]` milliseconds, then labels by `features[1]`
struct SlowScorer;

impl Scorer for SlowScorer {
    fn predict(&self, batch: &[Vec<f64>]) -> std::result::Result<Vec<Label>, ScoringError> {
        Ok(batch
            .iter()
            .map(|x| {
                std::thread::sleep(Duration::from_millis(x[0] as u64));
                x[1] as Label
            })
            .collect())
    }
}

struct Group {
    manager: DispatchManager<ChannelManagerTransport>,
    workers: Vec<JoinHandle<Result<WorkerSummary>>>,
}

impl Group {
    async fn start(client: &QueueClient, workers: usize, max_batch: usize, model: ModelState) -> Self {
        let (transport, endpoints) = channel_group(workers);
        let workers = endpoints
            .into_iter()
            .map(|t| tokio::spawn(async move { Worker::new(t).run().await }))
            .collect();
        let mut manager = DispatchManager::new(
            client.clone(),
            transport,
            Arc::new(UuidProvider),
            DispatchConfig {
                max_batch,
                ..Default::default()
            },
        );
        manager.broadcast(model).await.unwrap();
        Self { manager, workers }
    }

    async fn stop(mut self) -> Vec<WorkerSummary> {
        self.manager.stop_workers().await.unwrap();
        let mut summaries = Vec::new();
        for handle in self.workers {
            summaries.push(handle.await.unwrap().unwrap());
        }
        summaries
    }
}

async fn queues(dir: &std::path::Path) -> QueueClient {
    let client = client(StorageBackend::Json, dir, 100).await;
    client.create("transactions").await.unwrap();
    client.create("results").await.unwrap();
    client
}

#[tokio::test]
async fn test_round_robin_assignment_k7_w3() {
    let dir = tempfile::tempdir().unwrap();
    let client = queues(dir.path()).await;
    for i in 0..7 {
        client
            .push("transactions", Message::features(&[i as f64]))
            .await
            .unwrap();
    }

    let mut group = Group::start(&client, 3, 7, ModelState::new(Arc::new(ConstantScorer::new(1)))).await;
    let (_tx, mut token) = shutdown_channel();
    let report = group.manager.run_cycle(&mut token).await.unwrap().unwrap();

    assert_eq!(report.assignments, vec![1, 2, 3, 1, 2, 3, 1]);
    let summaries = group.stop().await;
    let per_rank: Vec<usize> = summaries.iter().map(|s| s.scored).collect();
    assert_eq!(per_rank, vec![3, 2, 2]);
}

#[tokio::test]
async fn test_gather_completes_regardless_of_completion_order() {
    let dir = tempfile::tempdir().unwrap();
    let client = queues(dir.path()).await;
    // Earlier items are slower, so replies arrive roughly in reverse
    for (delay, label) in [(120.0, 1.0), (80.0, 0.0), (40.0, 1.0), (0.0, 0.0)] {
        client
            .push("transactions", Message::new(json!({"features": [delay, label]})))
            .await
            .unwrap();
    }

    let mut group = Group::start(&client, 4, 5, ModelState::new(Arc::new(SlowScorer))).await;
    let (_tx, mut token) = shutdown_channel();
    let report = group.manager.run_cycle(&mut token).await.unwrap().unwrap();
    group.stop().await;

    assert_eq!(report.fetched, 4);
    assert_eq!(report.published(), 4);
    assert_eq!(client.len("results").await.unwrap(), 4);

    let mut labels = Vec::new();
    for _ in 0..4 {
        labels.push(client.pull("results").await.unwrap().payload()["prediction"].clone());
    }
    labels.sort_by_key(|v| v.as_i64());
    assert_eq!(labels, vec![json!(0), json!(0), json!(1), json!(1)]);
}

#[tokio::test]
async fn test_first_fetch_is_bounded_by_max_batch() {
    let dir = tempfile::tempdir().unwrap();
    let client = queues(dir.path()).await;
    for i in 0..12 {
        client
            .push("transactions", Message::features(&[i as f64]))
            .await
            .unwrap();
    }

    let mut group = Group::start(&client, 2, 5, ModelState::new(Arc::new(ConstantScorer::new(0)))).await;
    let (_tx, mut token) = shutdown_channel();

    let sizes = [
        group.manager.run_cycle(&mut token).await.unwrap().unwrap().fetched,
        group.manager.run_cycle(&mut token).await.unwrap().unwrap().fetched,
        group.manager.run_cycle(&mut token).await.unwrap().unwrap().fetched,
    ];
    group.stop().await;

    assert_eq!(sizes, [5, 5, 2]);
    assert_eq!(client.len("transactions").await.unwrap(), 0);
    assert_eq!(client.len("results").await.unwrap(), 12);
}

#[tokio::test]
async fn test_unscorable_item_becomes_error_record() {
    let dir = tempfile::tempdir().unwrap();
    let client = queues(dir.path()).await;
    client
        .push("transactions", Message::new(json!({"features": ["high", 2]})))
        .await
        .unwrap();
    client
        .push("transactions", Message::features(&[0.0, 1.0]))
        .await
        .unwrap();

    let mut group = Group::start(&client, 1, 5, ModelState::new(Arc::new(SlowScorer))).await;
    let (_tx, mut token) = shutdown_channel();
    let report = group.manager.run_cycle(&mut token).await.unwrap().unwrap();
    let summaries = group.stop().await;

    assert_eq!((report.predictions, report.failures), (1, 1));
    assert_eq!(summaries[0].failed, 1);

    // Single worker, FIFO inbox: results come back in push order
    let first = client.pull("results").await.unwrap().payload();
    assert!(first["error"].as_str().unwrap().contains("not a number"));
    let second = client.pull("results").await.unwrap().payload();
    assert_eq!(second, json!({"prediction": 1}));
}
