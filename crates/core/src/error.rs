// Central Error Type for the Application

use crate::domain::{QueueError, ScoringError, TransportError};
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Outbound queue '{queue}' still full (capacity {capacity}) after {attempts} attempts")]
    OutboundFull {
        queue: String,
        capacity: usize,
        attempts: usize,
    },

    #[error("Model file {0} not found")]
    MissingModelArtifact(String),

    #[error("Invalid model artifact: {0}")]
    InvalidModelArtifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Fatal errors end the process (and, at start-up, the whole process group).
    /// Queue errors are recoverable by the caller, except an outbound queue
    /// that stays full while results are pending.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::Transport(_)
                | AppError::OutboundFull { .. }
                | AppError::MissingModelArtifact(_)
                | AppError::InvalidModelArtifact(_)
                | AppError::Config(_)
        )
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
