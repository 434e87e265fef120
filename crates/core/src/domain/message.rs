// Message Domain Model

use crate::domain::error::ScoringError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved field stamped onto structured messages at push time
pub const QUEUED_AT_FIELD: &str = "queued_at";

/// Field carrying the feature vector inside a structured request
pub const FEATURES_FIELD: &str = "features";

/// Predicted class label
pub type Label = i64;

/// Opaque queue message (JSON serializable)
///
/// Structured records (JSON objects) get a `queued_at` stamp when pushed;
/// the stamp is metadata and is ignored by [`Message::payload_eq`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Value);

impl Message {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Request record `{features: [...]}`
    pub fn features(features: &[f64]) -> Self {
        Self(serde_json::json!({ FEATURES_FIELD: features }))
    }

    /// Result record `{prediction: n}`
    pub fn prediction(label: Label) -> Self {
        Self(serde_json::json!({ "prediction": label }))
    }

    /// Result record for an item that could not be scored
    pub fn scoring_failure(reason: impl Into<String>) -> Self {
        Self(serde_json::json!({ "error": reason.into() }))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn is_record(&self) -> bool {
        self.0.is_object()
    }

    /// Stamp a structured record with its ingestion time (RFC 3339).
    /// Non-record messages are returned untouched.
    pub fn stamped(mut self, queued_at: impl Into<String>) -> Self {
        if let Value::Object(map) = &mut self.0 {
            map.insert(QUEUED_AT_FIELD.to_string(), Value::String(queued_at.into()));
        }
        self
    }

    pub fn queued_at(&self) -> Option<&str> {
        self.0.get(QUEUED_AT_FIELD).and_then(Value::as_str)
    }

    /// Caller payload with the ingestion stamp removed
    pub fn payload(&self) -> Value {
        match &self.0 {
            Value::Object(map) => {
                let stripped: Map<String, Value> = map
                    .iter()
                    .filter(|(k, _)| k.as_str() != QUEUED_AT_FIELD)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Value::Object(stripped)
            }
            other => other.clone(),
        }
    }

    /// Payload equality, ignoring the ingestion stamp
    pub fn payload_eq(&self, other: &Message) -> bool {
        self.payload() == other.payload()
    }

    /// Extract the feature vector from either a raw array or a record
    /// carrying a `features` field.
    pub fn extract_features(&self) -> Result<Vec<f64>, ScoringError> {
        let raw = match &self.0 {
            Value::Object(map) => map.get(FEATURES_FIELD).ok_or_else(|| {
                ScoringError::InvalidFeatures(format!("record has no '{}' field", FEATURES_FIELD))
            })?,
            other => other,
        };

        let items = raw.as_array().ok_or_else(|| {
            ScoringError::InvalidFeatures(format!("expected a sequence of numbers, got {}", raw))
        })?;

        items
            .iter()
            .enumerate()
            .map(|(i, v)| {
                v.as_f64().ok_or_else(|| {
                    ScoringError::InvalidFeatures(format!("feature {} is not a number: {}", i, v))
                })
            })
            .collect()
    }
}

impl From<Value> for Message {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
