// Process group: one dispatch manager plus N scoring workers
//
// All ranks start together; workers block on the model broadcast, so a
// manager that fails to load the model takes the whole group down.

use crate::settings::ServiceSettings;
use futures::future::join_all;
use scoreq_core::application::constants::WORKER_SHUTDOWN_TIMEOUT;
use scoreq_core::application::{DispatchManager, QueueClient, ShutdownToken, Worker, WorkerSummary};
use scoreq_core::port::id_provider::UuidProvider;
use scoreq_core::port::ModelLoader;
use scoreq_core::Result;
use scoreq_infra_system::channel_group;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How the group ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupReport {
    /// Summaries of workers that exited cleanly, in rank order
    pub workers: Vec<WorkerSummary>,
}

impl GroupReport {
    pub fn scored(&self) -> usize {
        self.workers.iter().map(|w| w.scored).sum()
    }

    pub fn failed(&self) -> usize {
        self.workers.iter().map(|w| w.failed).sum()
    }
}

/// Run the group until `shutdown` fires or the manager hits a fatal error
pub async fn run_group(
    settings: &ServiceSettings,
    client: QueueClient,
    loader: &dyn ModelLoader,
    shutdown: ShutdownToken,
) -> Result<GroupReport> {
    for queue in [&settings.inbound_queue, &settings.outbound_queue] {
        if !client.ensure_queue(queue).await? {
            info!(queue = %queue, "Using existing queue");
        }
    }

    let (transport, endpoints) = channel_group(settings.workers);
    let handles: Vec<JoinHandle<Result<WorkerSummary>>> = endpoints
        .into_iter()
        .map(|endpoint| tokio::spawn(async move { Worker::new(endpoint).run().await }))
        .collect();

    let mut manager = DispatchManager::new(
        client,
        transport,
        Arc::new(UuidProvider),
        settings.dispatch_config(),
    );

    let result = match manager.start(loader, &settings.model_path()).await {
        Ok(()) => manager.run(shutdown).await,
        Err(e) => {
            error!(error = %e, "Manager start-up failed, aborting process group");
            Err(e)
        }
    };

    // Closing the manager endpoint releases any worker still blocked on it
    drop(manager);
    let workers = join_workers(handles).await;

    result.map(|()| GroupReport { workers })
}

async fn join_workers(handles: Vec<JoinHandle<Result<WorkerSummary>>>) -> Vec<WorkerSummary> {
    let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

    let joined = match tokio::time::timeout(WORKER_SHUTDOWN_TIMEOUT, join_all(handles)).await {
        Ok(joined) => joined,
        Err(_) => {
            warn!(
                timeout_secs = WORKER_SHUTDOWN_TIMEOUT.as_secs(),
                "Workers did not stop in time, aborting"
            );
            for abort in aborts {
                abort.abort();
            }
            return Vec::new();
        }
    };

    let mut summaries = Vec::new();
    for outcome in joined {
        match outcome {
            Ok(Ok(summary)) => summaries.push(summary),
            Ok(Err(e)) => warn!(error = %e, "Worker exited with error"),
            Err(e) => error!(error = ?e, "Worker task panicked"),
        }
    }
    summaries
}
