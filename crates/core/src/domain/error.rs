// Domain Error Types

use thiserror::Error;

/// Failure of a single queue operation.
///
/// `AlreadyExists`, `NotFound`, `Full` and `Empty` are the caller-recoverable
/// outcomes of the four queue operations; none of them mutates the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue '{0}' already exists")]
    AlreadyExists(String),

    #[error("Queue '{0}' does not exist")]
    NotFound(String),

    #[error("Queue '{queue}' is full (capacity {capacity})")]
    Full { queue: String, capacity: usize },

    #[error("Queue '{0}' is empty")]
    Empty(String),

    #[error("Invalid queue name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl QueueError {
    /// True for the steady-state "nothing to pull" signal used by polling loops
    pub fn is_empty(&self) -> bool {
        matches!(self, QueueError::Empty(_))
    }

    pub fn is_full(&self) -> bool {
        matches!(self, QueueError::Full { .. })
    }
}

/// Transport failures between the manager and its workers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Peer rank {0} disconnected")]
    Disconnected(usize),

    #[error("Unknown rank {0}")]
    UnknownRank(usize),

    #[error("Unexpected envelope from rank {rank}: expected {expected}, got {got}")]
    UnexpectedEnvelope {
        rank: usize,
        expected: String,
        got: String,
    },

    #[error("Model state was already broadcast")]
    AlreadyBroadcast,

    #[error("Gather timed out after {timeout_ms}ms with {} outstanding item(s)", outstanding.len())]
    GatherTimeout {
        timeout_ms: u64,
        outstanding: Vec<String>,
    },
}

/// Scoring failures, reported per item rather than crashing a worker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoringError {
    #[error("Invalid features: {0}")]
    InvalidFeatures(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Scoring panicked: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_error_messages() {
        let err = QueueError::Full {
            queue: "transactions".to_string(),
            capacity: 100,
        };
        assert_eq!(
            err.to_string(),
            "Queue 'transactions' is full (capacity 100)"
        );
        assert!(err.is_full());
        assert!(QueueError::Empty("results".to_string()).is_empty());
        assert!(!QueueError::NotFound("results".to_string()).is_empty());
    }

    #[test]
    fn test_gather_timeout_counts_outstanding() {
        let err = TransportError::GatherTimeout {
            timeout_ms: 500,
            outstanding: vec!["a".to_string(), "b".to_string()],
        };
        assert!(err.to_string().contains("2 outstanding"));
    }
}
