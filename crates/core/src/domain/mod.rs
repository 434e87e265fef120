// Domain Layer - Pure business logic and entities

pub mod envelope;
pub mod error;
pub mod message;
pub mod queue;

// Re-exports
pub use envelope::{
    round_robin_rank, Envelope, ItemId, Rank, ScoreOutcome, ScoreReply, Tag, WorkItem,
    MANAGER_RANK,
};
pub use error::{QueueError, ScoringError, TransportError};
pub use message::{Label, Message, FEATURES_FIELD, QUEUED_AT_FIELD};
pub use queue::{
    validate_queue_name, QueueInfo, QueueName, StoreConfig, RESULTS_QUEUE, TRANSACTIONS_QUEUE,
};
