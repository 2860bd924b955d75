pub mod error;
pub mod features;
pub mod goals;
pub mod models;

pub use error::*;
pub use features::*;
pub use goals::*;
pub use models::*;
