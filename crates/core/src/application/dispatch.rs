// Dispatch Manager - rank 0 of the process group
//
// LOADING_MODEL -> BROADCASTING -> DISPATCH_LOOP
// Each cycle: fetch a bounded batch, send round-robin, gather one reply per
// item (completion order), publishing each result record as its reply lands.

use crate::application::constants::*;
use crate::application::queue_client::QueueClient;
use crate::application::shutdown::ShutdownToken;
use crate::domain::{
    round_robin_rank, Envelope, ItemId, Message, QueueError, Rank, ScoreOutcome, ScoreReply, Tag,
    TransportError, WorkItem, RESULTS_QUEUE, TRANSACTIONS_QUEUE,
};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, ManagerTransport, ModelLoader, ModelState};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Manager loop settings
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub inbound_queue: String,
    pub outbound_queue: String,
    /// Upper bound on items pulled per cycle
    pub max_batch: usize,
    /// Sleep between fetch attempts on an empty inbound queue
    pub poll_interval: Duration,
    /// Bound on the wait for the next reply; `None` waits forever
    pub gather_timeout: Option<Duration>,
    pub error_recovery: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            inbound_queue: TRANSACTIONS_QUEUE.to_string(),
            outbound_queue: RESULTS_QUEUE.to_string(),
            max_batch: DEFAULT_MAX_BATCH,
            poll_interval: IDLE_SLEEP_DURATION,
            gather_timeout: Some(DEFAULT_GATHER_TIMEOUT),
            error_recovery: ERROR_RECOVERY_SLEEP_DURATION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerPhase {
    LoadingModel,
    Broadcasting,
    DispatchLoop,
}

/// What one dispatch cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    /// Worker rank per item, in fetch order
    pub assignments: Vec<Rank>,
    pub predictions: usize,
    pub failures: usize,
}

impl CycleReport {
    pub fn published(&self) -> usize {
        self.predictions + self.failures
    }
}

pub struct DispatchManager<T: ManagerTransport> {
    client: QueueClient,
    transport: T,
    id_provider: Arc<dyn IdProvider>,
    config: DispatchConfig,
    phase: ManagerPhase,
    model: Option<ModelState>,
}

impl<T: ManagerTransport> DispatchManager<T> {
    pub fn new(
        client: QueueClient,
        transport: T,
        id_provider: Arc<dyn IdProvider>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            client,
            transport,
            id_provider,
            config,
            phase: ManagerPhase::LoadingModel,
            model: None,
        }
    }

    pub fn phase(&self) -> ManagerPhase {
        self.phase
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Load the model artifact and broadcast it to every worker.
    ///
    /// A missing artifact is returned as `MissingModelArtifact`; the caller is
    /// expected to abort the whole process group.
    pub async fn start(&mut self, loader: &dyn ModelLoader, model_path: &Path) -> Result<()> {
        self.phase = ManagerPhase::LoadingModel;
        info!(model_path = %model_path.display(), "Loading model");
        let model = loader.load(model_path)?;
        self.broadcast(model).await
    }

    /// Broadcast an already loaded model (start-up barrier for all workers)
    pub async fn broadcast(&mut self, model: ModelState) -> Result<()> {
        self.phase = ManagerPhase::Broadcasting;
        self.transport.broadcast(&model).await?;
        info!(
            workers = self.transport.worker_count(),
            "Model broadcast to all workers"
        );
        self.model = Some(model);
        self.phase = ManagerPhase::DispatchLoop;
        Ok(())
    }

    /// Run dispatch cycles until shutdown, then STOP every worker.
    ///
    /// Recoverable queue errors are logged and retried after a recovery sleep;
    /// transport failures end the loop with an error.
    pub async fn run(&mut self, mut shutdown: ShutdownToken) -> Result<()> {
        if self.model.is_none() {
            return Err(AppError::Internal(
                "dispatch loop started before model broadcast".to_string(),
            ));
        }
        info!(
            workers = self.transport.worker_count(),
            max_batch = self.config.max_batch,
            "Dispatch loop running"
        );

        loop {
            if shutdown.is_shutdown() {
                break;
            }
            match self.run_cycle(&mut shutdown).await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Fatal error in dispatch loop");
                    return Err(e);
                }
                Err(e) => {
                    error!(error = %e, "Dispatch cycle failed, retrying");
                    tokio::select! {
                        _ = sleep(self.config.error_recovery) => {},
                        _ = shutdown.wait() => break,
                    }
                }
            }
        }

        info!("Dispatch loop shutting down");
        self.stop_workers().await
    }

    /// One fetch -> dispatch -> gather cycle.
    /// Returns `None` if shutdown arrived while waiting for work.
    pub async fn run_cycle(&mut self, shutdown: &mut ShutdownToken) -> Result<Option<CycleReport>> {
        let batch = match self.fetch(shutdown).await? {
            Some(batch) => batch,
            None => return Ok(None),
        };
        info!(batch_size = batch.len(), "Fetched requests");

        let fetched = batch.len();
        let (outstanding, assignments) = self.dispatch(batch).await?;
        let (predictions, failures) = self.gather(outstanding).await?;

        Ok(Some(CycleReport {
            fetched,
            assignments,
            predictions,
            failures,
        }))
    }

    /// Pull between 1 and `max_batch` items, polling while the queue is empty
    pub async fn fetch(&self, shutdown: &mut ShutdownToken) -> Result<Option<Vec<Message>>> {
        loop {
            let batch = self
                .client
                .pull_batch(&self.config.inbound_queue, self.config.max_batch)
                .await?;
            if !batch.is_empty() {
                return Ok(Some(batch));
            }
            if !self
                .client
                .wait_for_arrival(self.config.poll_interval, shutdown)
                .await
            {
                return Ok(None);
            }
        }
    }

    /// Send item `i` as WORK to rank `(i mod workers) + 1`
    async fn dispatch(&mut self, batch: Vec<Message>) -> Result<(HashSet<ItemId>, Vec<Rank>)> {
        let workers = self.transport.worker_count();
        if workers == 0 {
            return Err(AppError::Config("no workers in process group".to_string()));
        }

        let mut outstanding = HashSet::with_capacity(batch.len());
        let mut assignments = Vec::with_capacity(batch.len());
        for (i, request) in batch.into_iter().enumerate() {
            let dest = round_robin_rank(i, workers);
            let id = self.id_provider.generate_id();
            debug!(item_id = %id, rank = dest, "Dispatching");
            self.transport
                .send(
                    dest,
                    Envelope::Work(WorkItem {
                        id: id.clone(),
                        request,
                    }),
                )
                .await?;
            outstanding.insert(id);
            assignments.push(dest);
        }
        Ok((outstanding, assignments))
    }

    /// One DONE reply per outstanding item, from any worker, in completion order.
    /// Each reply is published as soon as it arrives, so a later timeout never
    /// discards results already in hand.
    async fn gather(&mut self, mut outstanding: HashSet<ItemId>) -> Result<(usize, usize)> {
        let (mut predictions, mut failures) = (0, 0);
        while !outstanding.is_empty() {
            let received = match self.config.gather_timeout {
                Some(limit) => match timeout(limit, self.transport.recv_any()).await {
                    Ok(received) => received?,
                    Err(_) => {
                        let mut missing: Vec<ItemId> = outstanding.into_iter().collect();
                        missing.sort();
                        return Err(TransportError::GatherTimeout {
                            timeout_ms: limit.as_millis() as u64,
                            outstanding: missing,
                        }
                        .into());
                    }
                },
                None => self.transport.recv_any().await?,
            };

            let reply = match received {
                (_, Envelope::Done(reply)) if outstanding.remove(&reply.id) => reply,
                (rank, Envelope::Done(reply)) => {
                    warn!(rank, item_id = %reply.id, "Ignoring reply for unknown item");
                    continue;
                }
                (rank, other) => {
                    return Err(TransportError::UnexpectedEnvelope {
                        rank,
                        expected: Tag::Done.to_string(),
                        got: other.tag().to_string(),
                    }
                    .into());
                }
            };

            if let Err(e) = self.publish(&reply).await {
                error!(
                    item_id = %reply.id,
                    unpublished = outstanding.len() + 1,
                    "Could not publish result"
                );
                return Err(e);
            }
            match reply.outcome {
                ScoreOutcome::Prediction(_) => predictions += 1,
                ScoreOutcome::Failed(_) => failures += 1,
            }
        }
        Ok((predictions, failures))
    }

    /// Push one result record, retrying while the outbound queue is full.
    /// A queue that stays full is fatal: the request is already consumed.
    async fn publish(&self, reply: &ScoreReply) -> Result<()> {
        let record = reply.outcome.to_record();
        let mut attempts = 0;
        loop {
            match self
                .client
                .push(&self.config.outbound_queue, record.clone())
                .await
            {
                Ok(()) => break,
                Err(QueueError::Full { .. }) if attempts + 1 < PUBLISH_FULL_RETRY_LIMIT => {
                    attempts += 1;
                    if attempts == 1 {
                        warn!(queue = %self.config.outbound_queue, "Outbound queue full, retrying");
                    }
                    sleep(self.config.poll_interval).await;
                }
                Err(QueueError::Full { queue, capacity }) => {
                    return Err(AppError::OutboundFull {
                        queue,
                        capacity,
                        attempts: attempts + 1,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        match &reply.outcome {
            ScoreOutcome::Prediction(label) => {
                info!(item_id = %reply.id, prediction = label, "Pushed result");
            }
            ScoreOutcome::Failed(reason) => {
                warn!(item_id = %reply.id, reason = %reason, "Pushed scoring failure");
            }
        }
        Ok(())
    }

    /// Send STOP to every worker
    pub async fn stop_workers(&mut self) -> Result<()> {
        for rank in 1..=self.transport.worker_count() {
            self.transport.send(rank, Envelope::Stop).await?;
        }
        Ok(())
    }
}
