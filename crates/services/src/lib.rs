pub mod calibrator;
pub mod explanation;
pub mod metrics;
pub mod predictor;
pub mod review;
pub mod selector;

pub use calibrator::*;
pub use explanation::*;
pub use metrics::*;
pub use predictor::*;
pub use review::*;
pub use selector::*;
