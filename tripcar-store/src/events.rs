use tokio::sync::broadcast;
use tracing::{debug, info};

use tripcar_core::events::EventSink;
use tripcar_shared::DomainEvent;

/// In-process fan-out of domain events. Subscribers that lag lose the oldest
/// events, and publishing with no subscriber is not an error.
#[derive(Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventSink for EventPublisher {
    fn publish(&self, event: DomainEvent) {
        let topic = event.topic();
        let booking_id = event.booking_id();
        match self.sender.send(event) {
            Ok(receivers) => info!("Published {} for booking {} to {} subscriber(s)", topic, booking_id, receivers),
            Err(_) => debug!("No subscribers for {} (booking {})", topic, booking_id),
        }
    }
}
