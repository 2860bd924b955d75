// Message serialization and deserialization

use chrono::{DateTime, Utc};
use leo_models::{CalibrationWeight, PredictionDecision, ReviewOutcome};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Message encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EngineEvent {
    DecisionRecorded { decision: PredictionDecision },
    OutcomeReviewed { outcome: ReviewOutcome },
    WeightsUpdated { weights: Vec<CalibrationWeight> },
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::DecisionRecorded { .. } => "decision_recorded",
            EngineEvent::OutcomeReviewed { .. } => "outcome_reviewed",
            EngineEvent::WeightsUpdated { .. } => "weights_updated",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event: EngineEvent,
}

impl StreamMessage {
    pub fn new(event: EngineEvent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, StreamError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StreamError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
