// In-process transport over tokio channels
//
// One manager endpoint and N worker endpoints. Each worker has its own inbox,
// so per-pair ordering follows from mpsc FIFO; all replies share one return
// channel tagged with the sender's rank.

use async_trait::async_trait;
use scoreq_core::domain::{Envelope, Rank, TransportError, MANAGER_RANK};
use scoreq_core::port::{ManagerTransport, ModelState, TransportResult, WorkerTransport};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Build a connected manager endpoint and `workers` worker endpoints (ranks 1..=workers)
pub fn channel_group(workers: usize) -> (ChannelManagerTransport, Vec<ChannelWorkerTransport>) {
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let mut inboxes = Vec::with_capacity(workers);
    let mut model_txs = Vec::with_capacity(workers);
    let mut endpoints = Vec::with_capacity(workers);

    for rank in 1..=workers {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (model_tx, model_rx) = oneshot::channel();
        inboxes.push(inbox_tx);
        model_txs.push(model_tx);
        endpoints.push(ChannelWorkerTransport {
            rank,
            model: Some(model_rx),
            inbox: inbox_rx,
            outbox: reply_tx.clone(),
        });
    }

    let manager = ChannelManagerTransport {
        inboxes,
        model_txs: Some(model_txs),
        replies: reply_rx,
    };
    (manager, endpoints)
}

pub struct ChannelManagerTransport {
    inboxes: Vec<mpsc::UnboundedSender<Envelope>>,
    /// Taken on broadcast; `None` afterwards
    model_txs: Option<Vec<oneshot::Sender<ModelState>>>,
    replies: mpsc::UnboundedReceiver<(Rank, Envelope)>,
}

#[async_trait]
impl ManagerTransport for ChannelManagerTransport {
    fn worker_count(&self) -> usize {
        self.inboxes.len()
    }

    async fn broadcast(&mut self, model: &ModelState) -> TransportResult<()> {
        let senders = self
            .model_txs
            .take()
            .ok_or(TransportError::AlreadyBroadcast)?;

        for (idx, tx) in senders.into_iter().enumerate() {
            let rank = idx + 1;
            tx.send(model.clone())
                .map_err(|_| TransportError::Disconnected(rank))?;
            debug!(rank, "Model delivered");
        }
        Ok(())
    }

    async fn send(&mut self, dest: Rank, envelope: Envelope) -> TransportResult<()> {
        let inbox = dest
            .checked_sub(1)
            .and_then(|idx| self.inboxes.get(idx))
            .ok_or(TransportError::UnknownRank(dest))?;
        inbox
            .send(envelope)
            .map_err(|_| TransportError::Disconnected(dest))
    }

    async fn recv_any(&mut self) -> TransportResult<(Rank, Envelope)> {
        // The reply channel closes only once every worker endpoint is gone
        self.replies
            .recv()
            .await
            .ok_or(TransportError::Disconnected(self.inboxes.len()))
    }
}

pub struct ChannelWorkerTransport {
    rank: Rank,
    model: Option<oneshot::Receiver<ModelState>>,
    inbox: mpsc::UnboundedReceiver<Envelope>,
    outbox: mpsc::UnboundedSender<(Rank, Envelope)>,
}

#[async_trait]
impl WorkerTransport for ChannelWorkerTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    async fn await_model(&mut self) -> TransportResult<ModelState> {
        let rx = self
            .model
            .take()
            .ok_or(TransportError::Disconnected(MANAGER_RANK))?;
        rx.await
            .map_err(|_| TransportError::Disconnected(MANAGER_RANK))
    }

    async fn recv(&mut self) -> TransportResult<Envelope> {
        self.inbox
            .recv()
            .await
            .ok_or(TransportError::Disconnected(MANAGER_RANK))
    }

    async fn reply(&mut self, envelope: Envelope) -> TransportResult<()> {
        self.outbox
            .send((self.rank, envelope))
            .map_err(|_| TransportError::Disconnected(MANAGER_RANK))
    }
}
