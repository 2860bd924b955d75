use thiserror::Error;

#[derive(Error, Debug)]
pub enum MlError {
    #[error("Not enough training samples: got {got}, need {need}")]
    InsufficientSamples { got: usize, need: usize },

    #[error("Model training failed: {0}")]
    Training(String),

    #[error("Invalid feature matrix: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Model serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
