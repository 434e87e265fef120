// Worker - scoring loop for ranks 1..=N
//
// AWAIT_MODEL -> READY -> {RECEIVE -> SCORE -> REPLY}* -> STOPPED

use crate::domain::{
    Envelope, Message, Rank, ScoreOutcome, ScoreReply, ScoringError, Tag, TransportError,
    MANAGER_RANK,
};
use crate::error::Result;
use crate::port::{ModelState, WorkerTransport};
use tracing::{debug, error, info};

/// Counters reported when a worker stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub rank: Rank,
    pub scored: usize,
    pub failed: usize,
}

pub struct Worker<T: WorkerTransport> {
    transport: T,
}

impl<T: WorkerTransport> Worker<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Wait for the broadcast model, then serve WORK until STOP.
    ///
    /// Scoring problems are replied as failures; only transport failures
    /// end the loop with an error.
    pub async fn run(&mut self) -> Result<WorkerSummary> {
        let rank = self.transport.rank();
        let model = self.transport.await_model().await?;
        info!(rank, "Model received, worker ready");

        let mut summary = WorkerSummary {
            rank,
            ..Default::default()
        };

        loop {
            match self.transport.recv().await? {
                Envelope::Work(item) => {
                    debug!(rank, item_id = %item.id, request = %item.request, "Got work");
                    let outcome = score_request(&model, &item.request).await;
                    match &outcome {
                        ScoreOutcome::Prediction(label) => {
                            summary.scored += 1;
                            debug!(rank, prediction = label, "Scored");
                        }
                        ScoreOutcome::Failed(reason) => {
                            summary.failed += 1;
                            error!(rank, item_id = %item.id, reason = %reason, "Scoring failed");
                        }
                    }
                    self.transport
                        .reply(Envelope::Done(ScoreReply {
                            id: item.id,
                            outcome,
                        }))
                        .await?;
                }
                Envelope::Stop => break,
                other @ Envelope::Done(_) => {
                    return Err(TransportError::UnexpectedEnvelope {
                        rank: MANAGER_RANK,
                        expected: format!("{} or {}", Tag::Work, Tag::Stop),
                        got: other.tag().to_string(),
                    }
                    .into());
                }
            }
        }

        info!(
            rank,
            scored = summary.scored,
            failed = summary.failed,
            "Worker stopped"
        );
        Ok(summary)
    }
}

/// Score one request on the blocking pool.
///
/// Accepts a raw feature sequence or a record with a `features` field. A panic
/// inside the model is caught and reported as a failed item.
pub async fn score_request(model: &ModelState, request: &Message) -> ScoreOutcome {
    let features = match request.extract_features() {
        Ok(features) => features,
        Err(e) => return ScoreOutcome::Failed(e.to_string()),
    };

    let model = model.clone();
    match tokio::task::spawn_blocking(move || model.predict_one(features)).await {
        Ok(Ok(label)) => ScoreOutcome::Prediction(label),
        Ok(Err(e)) => ScoreOutcome::Failed(e.to_string()),
        Err(join_err) => {
            let reason = if join_err.is_panic() {
                let panic_info = join_err.into_panic();
                if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                }
            } else {
                "scoring task cancelled".to_string()
            };
            ScoreOutcome::Failed(ScoringError::Panicked(reason).to_string())
        }
    }
}
