pub mod connection;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod schema;
pub mod store;

pub use connection::*;
pub use error::*;
pub use memory::*;
pub use postgres::*;
pub use schema::*;
pub use store::*;
