use tripcar_shared::DomainEvent;

/// Fire-and-forget outlet for domain events. Publishing never fails the
/// operation that produced the event.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

