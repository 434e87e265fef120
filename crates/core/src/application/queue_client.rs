// Queue Client - the API surface every process uses to touch a queue

use crate::application::shutdown::ShutdownToken;
use crate::domain::{Message, QueueError, QueueInfo};
use crate::port::{QueueStore, StoreResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, info};

/// Thin client over a [`QueueStore`].
///
/// The four store operations pass straight through. On top of them the client
/// offers the caller-side policies: ignore-if-exists creation, bounded batch
/// pulls, and sleep-and-retry waiting. Pushes made through any clone of a
/// client wake that client's in-process waiters early; arrivals from other
/// processes are picked up by polling.
#[derive(Clone)]
pub struct QueueClient {
    store: Arc<dyn QueueStore>,
    arrivals: Arc<Notify>,
}

impl QueueClient {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            arrivals: Arc::new(Notify::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    pub async fn create(&self, name: &str) -> StoreResult<()> {
        self.store.create(name).await
    }

    pub async fn delete(&self, name: &str) -> StoreResult<()> {
        self.store.delete(name).await
    }

    pub async fn push(&self, name: &str, message: Message) -> StoreResult<()> {
        self.store.push(name, message).await?;
        self.arrivals.notify_waiters();
        Ok(())
    }

    pub async fn pull(&self, name: &str) -> StoreResult<Message> {
        self.store.pull(name).await
    }

    pub async fn len(&self, name: &str) -> StoreResult<usize> {
        self.store.len(name).await
    }

    pub async fn status(&self) -> StoreResult<Vec<QueueInfo>> {
        self.store.list().await
    }

    /// Create a queue, treating `AlreadyExists` as success.
    /// Returns true if this call created it.
    pub async fn ensure_queue(&self, name: &str) -> StoreResult<bool> {
        match self.store.create(name).await {
            Ok(()) => {
                info!(queue = %name, "Created queue");
                Ok(true)
            }
            Err(QueueError::AlreadyExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Pull up to `max` messages, stopping early at the first `Empty`.
    /// Any other failure is returned as-is.
    pub async fn pull_batch(&self, name: &str, max: usize) -> StoreResult<Vec<Message>> {
        let mut batch = Vec::with_capacity(max);
        while batch.len() < max {
            match self.store.pull(name).await {
                Ok(msg) => batch.push(msg),
                Err(QueueError::Empty(_)) => break,
                Err(e) => {
                    if batch.is_empty() {
                        return Err(e);
                    }
                    // Already-popped messages must not be lost
                    debug!(queue = %name, error = %e, pulled = batch.len(), "Batch pull cut short");
                    break;
                }
            }
        }
        Ok(batch)
    }

    /// Pull one message, sleeping `poll` between empty attempts.
    /// Returns `None` if shutdown is signalled first.
    pub async fn pull_wait(
        &self,
        name: &str,
        poll: Duration,
        shutdown: &mut ShutdownToken,
    ) -> StoreResult<Option<Message>> {
        loop {
            if shutdown.is_shutdown() {
                return Ok(None);
            }
            match self.store.pull(name).await {
                Ok(msg) => return Ok(Some(msg)),
                Err(QueueError::Empty(_)) => {
                    if !self.wait_for_arrival(poll, shutdown).await {
                        return Ok(None);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sleep for `poll` or until a local push / shutdown, whichever is first.
    /// Returns false on shutdown.
    pub async fn wait_for_arrival(&self, poll: Duration, shutdown: &mut ShutdownToken) -> bool {
        tokio::select! {
            _ = sleep(poll) => true,
            _ = self.arrivals.notified() => true,
            _ = shutdown.wait() => false,
        }
    }
}
