use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum LeoError {
    #[error("Invalid probability: {prob}, must be between 0.0 and 1.0")]
    InvalidProbability { prob: f64 },

    #[error("Invalid score format: {0}")]
    InvalidScore(String),

    #[error("Unknown market: {0}")]
    UnknownMarket(String),

    #[error("Unknown selection: {0}")]
    UnknownSelection(String),

    #[error("Selection {selection} is not an outcome of market {market}")]
    SelectionNotInMarket { market: String, selection: String },

    #[error("Unknown signal source: {0}")]
    UnknownSource(String),

    #[error("Unknown decision status: {0}")]
    UnknownStatus(String),

    #[error("Decision {decision_id} cannot move from {from} to {to}")]
    InvalidTransition { decision_id: Uuid, from: String, to: String },

    #[error("Decision {decision_id} has no market pick to review")]
    NothingToReview { decision_id: Uuid },

    #[error("Fixture not found: {fixture_id}")]
    FixtureNotFound { fixture_id: String },

    #[error("Invalid learning rate: {0}, must be in (0.0, 1.0)")]
    InvalidLearningRate(f64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LeoError>;
