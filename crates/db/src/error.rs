use leo_models::LeoError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Fixture {fixture_id} already has an active decision")]
    DuplicateDecision { fixture_id: String },

    #[error("Decision not found: {0}")]
    DecisionNotFound(Uuid),

    #[error("Decision {0} already has a review outcome")]
    AlreadyReviewed(Uuid),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Model(#[from] LeoError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Result source unavailable: {0}")]
    Unavailable(String),

    #[error("Fixture unknown to result source: {0}")]
    UnknownFixture(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
