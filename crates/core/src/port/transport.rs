// Transport Port (manager <-> worker message passing)
//
// Point-to-point tagged send/receive plus a one-shot broadcast from the root.
// Delivery is assumed reliable and ordered between any fixed pair of ranks;
// nothing is promised across different pairs.

use crate::domain::{Envelope, Rank, TransportError};
use crate::port::ModelState;
use async_trait::async_trait;

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Manager (rank 0) side of the transport
#[async_trait]
pub trait ManagerTransport: Send {
    /// Number of workers; their ranks are `1..=worker_count()`
    fn worker_count(&self) -> usize;

    /// Deliver the shared model to every worker exactly once
    async fn broadcast(&mut self, model: &ModelState) -> TransportResult<()>;

    /// Send one envelope to a worker
    async fn send(&mut self, dest: Rank, envelope: Envelope) -> TransportResult<()>;

    /// Block until any worker sends an envelope
    async fn recv_any(&mut self) -> TransportResult<(Rank, Envelope)>;
}

/// Worker (rank >= 1) side of the transport
#[async_trait]
pub trait WorkerTransport: Send {
    fn rank(&self) -> Rank;

    /// Block until the broadcast model arrives (start-up barrier)
    async fn await_model(&mut self) -> TransportResult<ModelState>;

    /// Block for the next envelope from the manager
    async fn recv(&mut self) -> TransportResult<Envelope>;

    /// Send an envelope back to the manager
    async fn reply(&mut self, envelope: Envelope) -> TransportResult<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::{ScoreOutcome, ScoreReply, Tag};
    use std::collections::VecDeque;

    /// Manager transport whose "workers" score inline with the broadcast model.
    ///
    /// Records every send as `(rank, tag)` so tests can check assignment order.
    pub struct LoopbackTransport {
        workers: usize,
        model: Option<ModelState>,
        pending: VecDeque<(Rank, Envelope)>,
        pub sent: Vec<(Rank, Tag)>,
        pub broadcasts: usize,
        /// Deliver replies newest-first to simulate out-of-order completion
        pub reverse_completion: bool,
        /// Silently drop this many replies (simulates a lost worker reply)
        pub drop_replies: usize,
    }

    impl LoopbackTransport {
        pub fn new(workers: usize) -> Self {
            Self {
                workers,
                model: None,
                pending: VecDeque::new(),
                sent: Vec::new(),
                broadcasts: 0,
                reverse_completion: false,
                drop_replies: 0,
            }
        }

        /// Ranks that received WORK, in send order
        pub fn work_ranks(&self) -> Vec<Rank> {
            self.sent
                .iter()
                .filter(|(_, tag)| *tag == Tag::Work)
                .map(|(rank, _)| *rank)
                .collect()
        }

        /// Inject an arbitrary envelope as if a worker had sent it
        pub fn inject(&mut self, from: Rank, envelope: Envelope) {
            self.pending.push_back((from, envelope));
        }
    }

    #[async_trait]
    impl ManagerTransport for LoopbackTransport {
        fn worker_count(&self) -> usize {
            self.workers
        }

        async fn broadcast(&mut self, model: &ModelState) -> TransportResult<()> {
            if self.model.is_some() {
                return Err(TransportError::AlreadyBroadcast);
            }
            self.model = Some(model.clone());
            self.broadcasts += 1;
            Ok(())
        }

        async fn send(&mut self, dest: Rank, envelope: Envelope) -> TransportResult<()> {
            if dest == 0 || dest > self.workers {
                return Err(TransportError::UnknownRank(dest));
            }
            self.sent.push((dest, envelope.tag()));

            if let Envelope::Work(item) = envelope {
                if self.drop_replies > 0 {
                    self.drop_replies -= 1;
                    return Ok(());
                }
                let model = self.model.as_ref().ok_or(TransportError::Disconnected(dest))?;
                let outcome = match item
                    .request
                    .extract_features()
                    .and_then(|f| model.predict_one(f))
                {
                    Ok(label) => ScoreOutcome::Prediction(label),
                    Err(e) => ScoreOutcome::Failed(e.to_string()),
                };
                self.pending.push_back((
                    dest,
                    Envelope::Done(ScoreReply {
                        id: item.id,
                        outcome,
                    }),
                ));
            }
            Ok(())
        }

        async fn recv_any(&mut self) -> TransportResult<(Rank, Envelope)> {
            let next = if self.reverse_completion {
                self.pending.pop_back()
            } else {
                self.pending.pop_front()
            };
            match next {
                Some(msg) => Ok(msg),
                // A lost reply stalls forever, like a real blocking receive
                None => std::future::pending().await,
            }
        }
    }

    /// Worker transport fed from a script of incoming envelopes
    pub struct ScriptedWorkerTransport {
        rank: Rank,
        model: Option<ModelState>,
        incoming: VecDeque<Envelope>,
        pub replies: Vec<Envelope>,
    }

    impl ScriptedWorkerTransport {
        pub fn new(rank: Rank, model: Option<ModelState>, incoming: Vec<Envelope>) -> Self {
            Self {
                rank,
                model,
                incoming: incoming.into(),
                replies: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl WorkerTransport for ScriptedWorkerTransport {
        fn rank(&self) -> Rank {
            self.rank
        }

        async fn await_model(&mut self) -> TransportResult<ModelState> {
            self.model
                .clone()
                .ok_or(TransportError::Disconnected(crate::domain::MANAGER_RANK))
        }

        async fn recv(&mut self) -> TransportResult<Envelope> {
            self.incoming
                .pop_front()
                .ok_or(TransportError::Disconnected(crate::domain::MANAGER_RANK))
        }

        async fn reply(&mut self, envelope: Envelope) -> TransportResult<()> {
            self.replies.push(envelope);
            Ok(())
        }
    }
}
