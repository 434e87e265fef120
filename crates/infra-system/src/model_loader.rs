// JSON model artifact loader
//
// The artifact is a single JSON document tagged by `kind`. Loading happens once
// on the manager; the resulting scorer is shared read-only by every worker.

use scoreq_core::domain::{Label, ScoringError};
use scoreq_core::port::{ModelLoader, ModelState, Scorer};
use scoreq_core::{AppError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Artifact {
    Constant {
        label: Label,
    },
    Logistic {
        weights: Vec<f64>,
        bias: f64,
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
    StumpForest {
        n_features: usize,
        trees: Vec<Stump>,
    },
}

fn default_threshold() -> f64 {
    0.5
}

/// Depth-one decision tree: `left` when `x[feature] <= threshold`, else `right`
#[derive(Debug, Clone, Deserialize)]
struct Stump {
    feature: usize,
    threshold: f64,
    left: Label,
    right: Label,
}

/// Same label for every input
struct ConstantModel {
    label: Label,
}

impl Scorer for ConstantModel {
    fn predict(&self, batch: &[Vec<f64>]) -> std::result::Result<Vec<Label>, ScoringError> {
        Ok(vec![self.label; batch.len()])
    }
}

struct LogisticModel {
    weights: Vec<f64>,
    bias: f64,
    threshold: f64,
}

impl Scorer for LogisticModel {
    fn predict(&self, batch: &[Vec<f64>]) -> std::result::Result<Vec<Label>, ScoringError> {
        batch
            .iter()
            .map(|x| {
                if x.len() != self.weights.len() {
                    return Err(ScoringError::InvalidFeatures(format!(
                        "expected {} features, got {}",
                        self.weights.len(),
                        x.len()
                    )));
                }
                let z: f64 = self.bias + self.weights.iter().zip(x).map(|(w, v)| w * v).sum::<f64>();
                let p = 1.0 / (1.0 + (-z).exp());
                Ok(if p >= self.threshold { 1 } else { 0 })
            })
            .collect()
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.weights.len())
    }
}

struct StumpForest {
    n_features: usize,
    trees: Vec<Stump>,
}

impl StumpForest {
    fn vote(&self, x: &[f64]) -> Label {
        let mut votes: BTreeMap<Label, usize> = BTreeMap::new();
        for tree in &self.trees {
            let label = if x[tree.feature] <= tree.threshold {
                tree.left
            } else {
                tree.right
            };
            *votes.entry(label).or_default() += 1;
        }
        // BTreeMap iterates labels ascending, so ties resolve to the lower label
        let mut best: Option<(Label, usize)> = None;
        for (label, count) in votes {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((label, count));
            }
        }
        best.map(|(label, _)| label).unwrap_or(0)
    }
}

impl Scorer for StumpForest {
    fn predict(&self, batch: &[Vec<f64>]) -> std::result::Result<Vec<Label>, ScoringError> {
        batch
            .iter()
            .map(|x| {
                if x.len() != self.n_features {
                    return Err(ScoringError::InvalidFeatures(format!(
                        "expected {} features, got {}",
                        self.n_features,
                        x.len()
                    )));
                }
                Ok(self.vote(x))
            })
            .collect()
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.n_features)
    }
}

/// Loads `constant`, `logistic` and `stump_forest` artifacts from JSON files
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonModelLoader;

impl JsonModelLoader {
    pub fn new() -> Self {
        Self
    }

    /// Decode an artifact already in memory
    pub fn parse(&self, source: &str, origin: &str) -> Result<ModelState> {
        let artifact: Artifact = serde_json::from_str(source)
            .map_err(|e| AppError::InvalidModelArtifact(format!("{}: {}", origin, e)))?;

        let scorer: Arc<dyn Scorer> = match artifact {
            Artifact::Constant { label } => Arc::new(ConstantModel { label }),
            Artifact::Logistic {
                weights,
                bias,
                threshold,
            } => {
                if weights.is_empty() {
                    return Err(AppError::InvalidModelArtifact(format!(
                        "{}: logistic model has no weights",
                        origin
                    )));
                }
                Arc::new(LogisticModel {
                    weights,
                    bias,
                    threshold,
                })
            }
            Artifact::StumpForest { n_features, trees } => {
                if trees.is_empty() {
                    return Err(AppError::InvalidModelArtifact(format!(
                        "{}: stump forest has no trees",
                        origin
                    )));
                }
                if let Some(bad) = trees.iter().find(|t| t.feature >= n_features) {
                    return Err(AppError::InvalidModelArtifact(format!(
                        "{}: tree splits on feature {} but model has {} features",
                        origin, bad.feature, n_features
                    )));
                }
                Arc::new(StumpForest { n_features, trees })
            }
        };

        Ok(ModelState::new(scorer))
    }
}

impl ModelLoader for JsonModelLoader {
    fn load(&self, path: &Path) -> Result<ModelState> {
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::MissingModelArtifact(path.display().to_string()));
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        let state = self.parse(&source, &path.display().to_string())?;
        info!(
            path = %path.display(),
            n_features = ?state.n_features(),
            "Model artifact loaded"
        );
        Ok(state)
    }
}
