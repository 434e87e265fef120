// Queue Domain Model

use crate::domain::error::QueueError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Queue identifier
pub type QueueName = String;

/// Inbound work queue (by convention)
pub const TRANSACTIONS_QUEUE: &str = "transactions";

/// Outbound result queue (by convention)
pub const RESULTS_QUEUE: &str = "results";

/// Default per-queue capacity
pub const DEFAULT_MAX_MESSAGES_PER_QUEUE: usize = 100;

/// Default durable snapshot location
pub const DEFAULT_STORAGE_PATH: &str = "queues.json";

const MAX_QUEUE_NAME_LEN: usize = 64;

/// Store configuration (the only options a store consumes)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Caps the length of every queue
    #[serde(default = "default_max_messages")]
    pub max_messages_per_queue: usize,

    /// Location of the durable store
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
}

fn default_max_messages() -> usize {
    DEFAULT_MAX_MESSAGES_PER_QUEUE
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORAGE_PATH)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_messages_per_queue: DEFAULT_MAX_MESSAGES_PER_QUEUE,
            storage_path: default_storage_path(),
        }
    }
}

impl StoreConfig {
    pub fn new(max_messages_per_queue: usize, storage_path: impl Into<PathBuf>) -> Self {
        Self {
            max_messages_per_queue,
            storage_path: storage_path.into(),
        }
    }
}

/// Queue name and its current length (for status listings)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInfo {
    pub name: QueueName,
    pub len: usize,
}

/// Validate a queue name: non-empty, bounded, `[A-Za-z0-9_.-]` only
pub fn validate_queue_name(name: &str) -> Result<(), QueueError> {
    let invalid = |reason: &str| QueueError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_QUEUE_NAME_LEN {
        return Err(invalid("name too long (max 64 chars)"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(invalid("only alphanumeric, '_', '-' and '.' allowed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_queue_name() {
        assert!(validate_queue_name(TRANSACTIONS_QUEUE).is_ok());
        assert!(validate_queue_name("results-v2.eu_west").is_ok());

        let empty = validate_queue_name("").unwrap_err();
        assert!(empty.to_string().contains("empty"));

        let long = validate_queue_name(&"q".repeat(65)).unwrap_err();
        assert!(long.to_string().contains("too long"));

        let bad = validate_queue_name("bad queue!").unwrap_err();
        assert!(bad.to_string().contains("alphanumeric"));
    }

    #[test]
    fn test_store_config_defaults_from_partial_json() {
        let cfg: StoreConfig = serde_json::from_str(r#"{"max_messages_per_queue": 7}"#).unwrap();
        assert_eq!(cfg.max_messages_per_queue, 7);
        assert_eq!(cfg.storage_path, PathBuf::from("queues.json"));
        assert_eq!(StoreConfig::default().max_messages_per_queue, 100);
    }
}
