use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingCreatedEvent {
    pub booking_id: Uuid,
    pub vehicle_id: Uuid,
    pub renter_id: String,
    pub total_price: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingStatusChangedEvent {
    pub booking_id: Uuid,
    pub vehicle_id: Uuid,
    pub from: String,
    pub to: String,
    /// `None` when the change came from the automatic cascade.
    pub actor_id: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct PaymentReconciledEvent {
    pub booking_id: Uuid,
    pub order_ref: String,
    pub transaction_key: String,
    pub payment_status: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct PaymentAnomalyEvent {
    pub booking_id: Uuid,
    pub order_ref: String,
    pub event_kind: String,
    pub reason: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    BookingCreated(BookingCreatedEvent),
    BookingStatusChanged(BookingStatusChangedEvent),
    PaymentReconciled(PaymentReconciledEvent),
    PaymentAnomaly(PaymentAnomalyEvent),
}

impl DomainEvent {
    /// Routing key, the booking the event belongs to.
    pub fn booking_id(&self) -> Uuid {
        match self {
            DomainEvent::BookingCreated(e) => e.booking_id,
            DomainEvent::BookingStatusChanged(e) => e.booking_id,
            DomainEvent::PaymentReconciled(e) => e.booking_id,
            DomainEvent::PaymentAnomaly(e) => e.booking_id,
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::BookingCreated(_) => "booking.created",
            DomainEvent::BookingStatusChanged(_) => "booking.status_changed",
            DomainEvent::PaymentReconciled(_) => "payment.reconciled",
            DomainEvent::PaymentAnomaly(_) => "payment.anomaly",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_tagged_on_the_wire() {
        let event = DomainEvent::PaymentAnomaly(PaymentAnomalyEvent {
            booking_id: Uuid::nil(),
            order_ref: "ORDER_1".to_string(),
            event_kind: "canceled".to_string(),
            reason: "late cancel".to_string(),
            timestamp: 0,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "payment_anomaly");
        assert_eq!(event.topic(), "payment.anomaly");
    }
}
