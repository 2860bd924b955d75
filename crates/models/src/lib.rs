pub mod fixture;
pub mod predictions;
pub mod calibration;
pub mod market;
pub mod error;

pub use fixture::*;
pub use predictions::*;
pub use calibration::*;
pub use market::*;
pub use error::*;
