// Queue Store Port (Interface)

use crate::domain::{Message, QueueError, QueueInfo};
use async_trait::async_trait;

pub type StoreResult<T> = std::result::Result<T, QueueError>;

/// Persistent, capacity-bounded FIFO queues shared between processes.
///
/// Every call is one atomic reload-validate-mutate-persist unit. No call
/// blocks waiting for data; `Empty` is returned immediately instead.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Install an empty queue. Fails with `AlreadyExists` if present.
    async fn create(&self, name: &str) -> StoreResult<()>;

    /// Remove a queue and all its messages. Fails with `NotFound` if absent.
    async fn delete(&self, name: &str) -> StoreResult<()>;

    /// Stamp (structured records only) and append at the tail.
    /// Fails with `NotFound` or `Full`.
    async fn push(&self, name: &str, message: Message) -> StoreResult<()>;

    /// Pop the head message. Fails with `NotFound` or `Empty`.
    async fn pull(&self, name: &str) -> StoreResult<Message>;

    /// Current length of a queue. Fails with `NotFound`.
    async fn len(&self, name: &str) -> StoreResult<usize>;

    /// All queues with their lengths, sorted by name
    async fn list(&self) -> StoreResult<Vec<QueueInfo>>;

    /// Per-queue maximum length
    fn capacity(&self) -> usize;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::validate_queue_name;
    use crate::port::TimeProvider;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::{Arc, Mutex};

    /// Non-durable store with the same contract as the real ones
    pub struct InMemoryQueueStore {
        queues: Mutex<BTreeMap<String, VecDeque<Message>>>,
        capacity: usize,
        time_provider: Arc<dyn TimeProvider>,
    }

    impl InMemoryQueueStore {
        pub fn new(capacity: usize, time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                queues: Mutex::new(BTreeMap::new()),
                capacity,
                time_provider,
            }
        }

        fn with_queues<R>(
            &self,
            f: impl FnOnce(&mut BTreeMap<String, VecDeque<Message>>) -> StoreResult<R>,
        ) -> StoreResult<R> {
            let mut guard = self
                .queues
                .lock()
                .map_err(|_| QueueError::Storage("in-memory store poisoned".to_string()))?;
            f(&mut guard)
        }
    }

    #[async_trait]
    impl QueueStore for InMemoryQueueStore {
        async fn create(&self, name: &str) -> StoreResult<()> {
            validate_queue_name(name)?;
            self.with_queues(|queues| {
                if queues.contains_key(name) {
                    return Err(QueueError::AlreadyExists(name.to_string()));
                }
                queues.insert(name.to_string(), VecDeque::new());
                Ok(())
            })
        }

        async fn delete(&self, name: &str) -> StoreResult<()> {
            self.with_queues(|queues| {
                queues
                    .remove(name)
                    .map(|_| ())
                    .ok_or_else(|| QueueError::NotFound(name.to_string()))
            })
        }

        async fn push(&self, name: &str, message: Message) -> StoreResult<()> {
            let stamp = self.time_provider.now_rfc3339();
            let capacity = self.capacity;
            self.with_queues(|queues| {
                let queue = queues
                    .get_mut(name)
                    .ok_or_else(|| QueueError::NotFound(name.to_string()))?;
                if queue.len() >= capacity {
                    return Err(QueueError::Full {
                        queue: name.to_string(),
                        capacity,
                    });
                }
                queue.push_back(message.stamped(stamp));
                Ok(())
            })
        }

        async fn pull(&self, name: &str) -> StoreResult<Message> {
            self.with_queues(|queues| {
                queues
                    .get_mut(name)
                    .ok_or_else(|| QueueError::NotFound(name.to_string()))?
                    .pop_front()
                    .ok_or_else(|| QueueError::Empty(name.to_string()))
            })
        }

        async fn len(&self, name: &str) -> StoreResult<usize> {
            self.with_queues(|queues| {
                queues
                    .get(name)
                    .map(VecDeque::len)
                    .ok_or_else(|| QueueError::NotFound(name.to_string()))
            })
        }

        async fn list(&self) -> StoreResult<Vec<QueueInfo>> {
            self.with_queues(|queues| {
                Ok(queues
                    .iter()
                    .map(|(name, q)| QueueInfo {
                        name: name.clone(),
                        len: q.len(),
                    })
                    .collect())
            })
        }

        fn capacity(&self) -> usize {
            self.capacity
        }
    }
}
