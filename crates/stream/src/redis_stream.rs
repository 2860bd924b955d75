// Redis streaming implementation

use redis::aio::MultiplexedConnection;
use redis::Client;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::event_bus::EventBus;
use crate::message::{StreamError, StreamMessage};

/// Appends engine events to a capped Redis stream.
pub struct RedisStream {
    connection: MultiplexedConnection,
    stream_key: String,
    max_len: usize,
}

impl RedisStream {
    pub async fn new(redis_url: &str, stream_key: &str, max_len: usize) -> Result<Self, StreamError> {
        let client = Client::open(redis_url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        info!("📡 Connected to Redis stream {}", stream_key);
        Ok(Self {
            connection,
            stream_key: stream_key.to_string(),
            max_len,
        })
    }

    /// XADD with approximate trimming; returns the entry id.
    pub async fn publish(&self, message: &StreamMessage) -> Result<String, StreamError> {
        let payload = message.encode()?;
        let mut conn = self.connection.clone();
        let id = redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_len)
            .arg("*")
            .arg("kind")
            .arg(message.event.kind())
            .arg("payload")
            .arg(payload)
            .query_async::<_, String>(&mut conn)
            .await?;
        Ok(id)
    }

    /// Mirrors every bus event into the stream until the bus closes.
    pub fn spawn_forwarder(self, bus: &EventBus) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let message = StreamMessage::new(event);
                        if let Err(e) = self.publish(&message).await {
                            warn!(error = %e, kind = message.event.kind(), "failed to publish to redis stream");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "redis forwarder lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
