pub mod event_bus;
pub mod message;
pub mod redis_stream;

pub use event_bus::*;
pub use message::*;
pub use redis_stream::*;
