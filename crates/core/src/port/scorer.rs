// Scoring Model Port
// The model is an external collaborator: loaded once by the manager, shared read-only.

use crate::domain::error::ScoringError;
use crate::domain::Label;
use crate::error::Result;
use std::path::Path;
use std::sync::Arc;

/// Opaque scoring capability: `predict(batch of feature vectors) -> batch of labels`
pub trait Scorer: Send + Sync {
    fn predict(&self, batch: &[Vec<f64>]) -> std::result::Result<Vec<Label>, ScoringError>;

    /// Number of features the model expects, when known
    fn n_features(&self) -> Option<usize> {
        None
    }
}

/// Shared, immutable model state. Cloning shares the same underlying model.
#[derive(Clone)]
pub struct ModelState {
    scorer: Arc<dyn Scorer>,
}

impl ModelState {
    pub fn new(scorer: Arc<dyn Scorer>) -> Self {
        Self { scorer }
    }

    pub fn n_features(&self) -> Option<usize> {
        self.scorer.n_features()
    }

    /// Score a single item as a one-element batch
    pub fn predict_one(&self, features: Vec<f64>) -> std::result::Result<Label, ScoringError> {
        if let Some(expected) = self.scorer.n_features() {
            if features.len() != expected {
                return Err(ScoringError::InvalidFeatures(format!(
                    "expected {} features, got {}",
                    expected,
                    features.len()
                )));
            }
        }

        let labels = self.scorer.predict(&[features])?;
        labels.first().copied().ok_or_else(|| {
            ScoringError::Model("model returned no label for a single-item batch".to_string())
        })
    }

    /// True if both states share the same model instance
    pub fn same_model(&self, other: &ModelState) -> bool {
        Arc::ptr_eq(&self.scorer, &other.scorer)
    }
}

impl std::fmt::Debug for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelState")
            .field("n_features", &self.scorer.n_features())
            .finish()
    }
}

/// Reads the model artifact from external storage (manager only)
pub trait ModelLoader: Send + Sync {
    /// # Errors
    /// - `AppError::MissingModelArtifact` if nothing exists at `path`
    /// - `AppError::InvalidModelArtifact` if the artifact cannot be decoded
    fn load(&self, path: &Path) -> Result<ModelState>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the same label for any input
    pub struct ConstantScorer {
        label: Label,
        calls: AtomicUsize,
    }

    impl ConstantScorer {
        pub fn new(label: Label) -> Self {
            Self {
                label,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Scorer for ConstantScorer {
        fn predict(&self, batch: &[Vec<f64>]) -> std::result::Result<Vec<Label>, ScoringError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![self.label; batch.len()])
        }
    }

    /// Labels 1 when the feature sum exceeds the threshold, else 0
    pub struct SumThresholdScorer {
        pub threshold: f64,
    }

    impl Scorer for SumThresholdScorer {
        fn predict(&self, batch: &[Vec<f64>]) -> std::result::Result<Vec<Label>, ScoringError> {
            Ok(batch
                .iter()
                .map(|row| i64::from(row.iter().sum::<f64>() > self.threshold))
                .collect())
        }
    }

    /// Always fails
    pub struct FailingScorer;

    impl Scorer for FailingScorer {
        fn predict(&self, _batch: &[Vec<f64>]) -> std::result::Result<Vec<Label>, ScoringError> {
            Err(ScoringError::Model("model exploded".to_string()))
        }
    }

    /// Panics inside predict
    pub struct PanickingScorer;

    impl Scorer for PanickingScorer {
        fn predict(&self, _batch: &[Vec<f64>]) -> std::result::Result<Vec<Label>, ScoringError> {
            panic!("scorer panic");
        }
    }

    /// Loader that always yields the given state
    pub struct StaticModelLoader {
        state: ModelState,
    }

    impl StaticModelLoader {
        pub fn new(state: ModelState) -> Self {
            Self { state }
        }
    }

    impl ModelLoader for StaticModelLoader {
        fn load(&self, _path: &Path) -> Result<ModelState> {
            Ok(self.state.clone())
        }
    }
}
