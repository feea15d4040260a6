use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use tripcar_core::booking::PaymentSettlement;
use tripcar_core::events::EventSink;
use tripcar_core::payment::{PaymentAnomaly, PaymentEvent};
use tripcar_core::repository::{AnomalyRepository, BookingRepository, DedupStore};
use tripcar_core::{Booking, BookingStatus, CoreError, CoreResult, PaymentStatus};
use tripcar_shared::models::events::{PaymentAnomalyEvent, PaymentReconciledEvent};
use tripcar_shared::DomainEvent;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// This event moved the payment status.
    Applied,
    /// The booking already carried the status this event asks for.
    AlreadyConverged,
    /// The event kind does not move payment status.
    Informational,
    /// The event contradicts a settled status; stored as an anomaly, not applied.
    ConflictRecorded,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied => "applied",
            ReconcileOutcome::AlreadyConverged => "already_converged",
            ReconcileOutcome::Informational => "informational",
            ReconcileOutcome::ConflictRecorded => "conflict_recorded",
        }
    }
}

/// Outcome of one payment event. Replays of the same event return exactly
/// the value computed the first time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reconciliation {
    pub booking_id: Uuid,
    pub payment_status: PaymentStatus,
    pub outcome: ReconcileOutcome,
}

/// Single convergence point for confirm calls and webhook deliveries.
pub struct PaymentReconciler {
    bookings: Arc<dyn BookingRepository>,
    anomalies: Arc<dyn AnomalyRepository>,
    dedup: Arc<dyn DedupStore>,
    events: Arc<dyn EventSink>,
    retention: Duration,
}

impl PaymentReconciler {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        anomalies: Arc<dyn AnomalyRepository>,
        dedup: Arc<dyn DedupStore>,
        events: Arc<dyn EventSink>,
        retention: Duration,
    ) -> Self {
        Self { bookings, anomalies, dedup, events, retention }
    }

    pub async fn reconcile(&self, event: &PaymentEvent) -> CoreResult<Reconciliation> {
        let booking = self
            .bookings
            .find_by_order_ref(&event.order_ref)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {}", event.order_ref)))?;

        let key = event.dedup_key();
        if let Some(previous) = self.dedup.recall(&key).await? {
            match serde_json::from_str::<Reconciliation>(&previous) {
                Ok(outcome) => {
                    info!(booking_id = %booking.id, key = %key, "Duplicate payment event, replaying outcome");
                    return Ok(outcome);
                }
                Err(e) => warn!(key = %key, error = %e, "Unreadable dedup record, reprocessing"),
            }
        }

        // Errors are returned before anything is remembered, so a redelivery
        // of a failed event gets processed again.
        let outcome = self.apply(booking, event).await?;

        let encoded = serde_json::to_string(&outcome)
            .map_err(|e| CoreError::Internal(format!("encode reconciliation: {}", e)))?;
        let stored = self.dedup.remember(&key, &encoded, self.retention).await?;
        if stored == encoded {
            return Ok(outcome);
        }
        // A concurrent delivery of the same event won the write.
        serde_json::from_str(&stored)
            .map_err(|e| CoreError::Internal(format!("decode reconciliation: {}", e)))
    }

    async fn apply(&self, booking: Booking, event: &PaymentEvent) -> CoreResult<Reconciliation> {
        let target = event.kind.target_status();

        if booking.payment_status.is_settled() {
            if let Some(target) = target {
                return self.settled(booking, event, target).await;
            }
        } else if let Some(amount) = event.amount {
            if amount != booking.total_price {
                warn!(booking_id = %booking.id, expected = booking.total_price, actual = amount, "Payment amount mismatch");
                return Err(CoreError::AmountMismatch { expected: booking.total_price, actual: amount });
            }
        }

        let Some(target) = target else {
            info!(booking_id = %booking.id, kind = %event.kind, "Informational payment event");
            return Ok(reconciliation(&booking, ReconcileOutcome::Informational));
        };

        if target == PaymentStatus::Paid && booking.status != BookingStatus::Approved {
            let reason = format!("payment completed for a booking that is {}", booking.status);
            return self.record_anomaly(&booking, event, reason).await;
        }

        let settlement = match target {
            PaymentStatus::Paid => PaymentSettlement {
                status: PaymentStatus::Paid,
                payment_key: Some(event.transaction_key.clone()),
                approved_at: Some(event.approval_timestamp()),
            },
            status => PaymentSettlement { status, payment_key: None, approved_at: None },
        };

        match self.bookings.settle_payment(booking.id, &settlement).await? {
            Some(updated) => {
                info!(booking_id = %updated.id, status = %updated.payment_status, kind = %event.kind, "Payment reconciled");
                self.events.publish(DomainEvent::PaymentReconciled(PaymentReconciledEvent {
                    booking_id: updated.id,
                    order_ref: event.order_ref.clone(),
                    transaction_key: event.transaction_key.clone(),
                    payment_status: updated.payment_status.to_string(),
                    timestamp: Utc::now().timestamp(),
                }));
                Ok(reconciliation(&updated, ReconcileOutcome::Applied))
            }
            None => {
                // Another trigger settled the booking first. Judge the event
                // against what it left behind.
                let current = self
                    .bookings
                    .get_booking(booking.id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("booking {}", booking.id)))?;
                if current.payment_status.is_settled() {
                    self.settled(current, event, target).await
                } else {
                    let reason = format!("payment could not be applied to a booking that is {}", current.status);
                    self.record_anomaly(&current, event, reason).await
                }
            }
        }
    }

    async fn settled(&self, booking: Booking, event: &PaymentEvent, target: PaymentStatus) -> CoreResult<Reconciliation> {
        if booking.payment_status == target {
            info!(booking_id = %booking.id, status = %target, "Payment already reconciled");
            return Ok(reconciliation(&booking, ReconcileOutcome::AlreadyConverged));
        }
        let reason = format!("late {} event for a booking already {}", event.kind, booking.payment_status);
        self.record_anomaly(&booking, event, reason).await
    }

    async fn record_anomaly(&self, booking: &Booking, event: &PaymentEvent, reason: String) -> CoreResult<Reconciliation> {
        warn!(booking_id = %booking.id, order_ref = %event.order_ref, kind = %event.kind, reason = %reason, "Payment anomaly recorded");
        let anomaly = PaymentAnomaly {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            order_ref: event.order_ref.clone(),
            transaction_key: event.transaction_key.clone(),
            event_kind: event.kind,
            current_status: booking.payment_status,
            reason: reason.clone(),
            occurred_at: event.occurred_at,
            recorded_at: Utc::now(),
        };
        self.anomalies.record_anomaly(&anomaly).await?;

        self.events.publish(DomainEvent::PaymentAnomaly(PaymentAnomalyEvent {
            booking_id: booking.id,
            order_ref: event.order_ref.clone(),
            event_kind: event.kind.to_string(),
            reason,
            timestamp: Utc::now().timestamp(),
        }));
        Ok(reconciliation(booking, ReconcileOutcome::ConflictRecorded))
    }
}

fn reconciliation(booking: &Booking, outcome: ReconcileOutcome) -> Reconciliation {
    Reconciliation { booking_id: booking.id, payment_status: booking.payment_status, outcome }
}
