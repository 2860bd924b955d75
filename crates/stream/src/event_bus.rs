// Event bus for internal message passing

use tokio::sync::broadcast;
use tracing::trace;

use crate::message::EngineEvent;

pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Fan-out of engine events. Publishing never blocks and never fails;
/// slow subscribers see `Lagged` instead of stalling the engine.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: EngineEvent) -> usize {
        let kind = event.kind();
        let delivered = self.sender.send(event).unwrap_or(0);
        trace!(kind, delivered, "engine event published");
        delivered
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
