// Transport Envelope (manager <-> worker protocol)

use crate::domain::message::{Label, Message};
use serde::{Deserialize, Serialize};

/// Process rank within the group. The manager is rank 0, workers are 1..=N.
pub type Rank = usize;

/// Rank of the manager (broadcast root)
pub const MANAGER_RANK: Rank = 0;

/// Correlation id carried from a WORK envelope to its DONE reply
pub type ItemId = String;

/// Integer tag on a transport message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    Work,
    Done,
    Stop,
}

impl Tag {
    pub const fn code(self) -> u8 {
        match self {
            Tag::Work => 11,
            Tag::Done => 22,
            Tag::Stop => 99,
        }
    }
}

impl TryFrom<u8> for Tag {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            11 => Ok(Tag::Work),
            22 => Ok(Tag::Done),
            99 => Ok(Tag::Stop),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tag::Work => write!(f, "WORK({})", self.code()),
            Tag::Done => write!(f, "DONE({})", self.code()),
            Tag::Stop => write!(f, "STOP({})", self.code()),
        }
    }
}

/// A pulled request forwarded to one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: ItemId,
    pub request: Message,
}

/// Outcome of scoring one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreOutcome {
    Prediction(Label),
    Failed(String),
}

impl ScoreOutcome {
    /// Result record to publish on the outbound queue
    pub fn to_record(&self) -> Message {
        match self {
            ScoreOutcome::Prediction(label) => Message::prediction(*label),
            ScoreOutcome::Failed(reason) => Message::scoring_failure(reason.clone()),
        }
    }
}

/// DONE reply from a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReply {
    pub id: ItemId,
    pub outcome: ScoreOutcome,
}

/// Tagged transport message. Only these three kinds exist, so worker tag
/// dispatch is an exhaustive match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Envelope {
    Work(WorkItem),
    Done(ScoreReply),
    Stop,
}

impl Envelope {
    pub fn tag(&self) -> Tag {
        match self {
            Envelope::Work(_) => Tag::Work,
            Envelope::Done(_) => Tag::Done,
            Envelope::Stop => Tag::Stop,
        }
    }
}

/// Static round-robin: item `index` of a batch goes to worker `(index mod workers) + 1`.
///
/// # Panics
/// Panics if `workers` is zero.
pub fn round_robin_rank(index: usize, workers: usize) -> Rank {
    assert!(workers > 0, "round-robin over an empty worker set");
    (index % workers) + 1
}
