use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use tripcar_core::payment::{ConfirmRequest, GatewayConfirmation, PaymentEvent, PaymentEventKind, PaymentGateway};
use tripcar_core::repository::BookingRepository;
use tripcar_core::{CoreError, CoreResult, PaymentStatus};

use crate::reconciler::{PaymentReconciler, ReconcileOutcome, Reconciliation};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedPayment {
    pub booking_id: Uuid,
}

/// Drives the synchronous side of a checkout: the confirm call after the
/// gateway redirect, and client-reported failures from the fail redirect.
pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    reconciler: Arc<PaymentReconciler>,
    bookings: Arc<dyn BookingRepository>,
}

impl PaymentOrchestrator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        reconciler: Arc<PaymentReconciler>,
        bookings: Arc<dyn BookingRepository>,
    ) -> Self {
        Self { gateway, reconciler, bookings }
    }

    pub async fn confirm_payment(
        &self,
        transaction_key: &str,
        order_ref: &str,
        amount: i64,
    ) -> CoreResult<ConfirmedPayment> {
        let booking = self
            .bookings
            .find_by_order_ref(order_ref)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_ref)))?;

        // Checked before the gateway is asked to capture anything.
        if amount != booking.total_price {
            warn!(booking_id = %booking.id, expected = booking.total_price, actual = amount, "Confirm amount mismatch");
            return Err(CoreError::AmountMismatch { expected: booking.total_price, actual: amount });
        }
        if booking.payment_status == PaymentStatus::Paid {
            info!(booking_id = %booking.id, "Confirm for an already paid booking");
            return Ok(ConfirmedPayment { booking_id: booking.id });
        }

        let request = ConfirmRequest {
            transaction_key: transaction_key.to_string(),
            order_ref: order_ref.to_string(),
            amount,
        };
        let confirmation = self.gateway.confirm(&request).await?;

        let event = PaymentEvent {
            order_ref: order_ref.to_string(),
            transaction_key: confirmation.transaction_key,
            kind: PaymentEventKind::Completed,
            amount: Some(amount),
            occurred_at: Utc::now(),
            approved_at: confirmation.approved_at,
        };
        let reconciliation = self.reconciler.reconcile(&event).await?;
        require_paid(&reconciliation)?;

        Ok(ConfirmedPayment { booking_id: reconciliation.booking_id })
    }

    /// Checkout failure reported by the fail redirect. Reconciled as an
    /// aborted event, so it can never undo a payment the gateway completed.
    /// Only the booking's renter may report.
    pub async fn report_failure(
        &self,
        order_ref: &str,
        renter_id: &str,
        code: &str,
        message: &str,
    ) -> CoreResult<Reconciliation> {
        let booking = self
            .bookings
            .find_by_order_ref(order_ref)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_ref)))?;
        if booking.renter_id != renter_id {
            return Err(CoreError::Forbidden("only the renter can report a checkout failure".to_string()));
        }

        warn!(order_ref = %order_ref, code = %code, message = %message, "Checkout failure reported");
        let event = PaymentEvent {
            order_ref: order_ref.to_string(),
            transaction_key: format!("client-failure:{}", code),
            kind: PaymentEventKind::Aborted,
            amount: None,
            occurred_at: Utc::now(),
            approved_at: None,
        };
        self.reconciler.reconcile(&event).await
    }
}

fn require_paid(reconciliation: &Reconciliation) -> CoreResult<()> {
    match (reconciliation.outcome, reconciliation.payment_status) {
        (ReconcileOutcome::Applied | ReconcileOutcome::AlreadyConverged, PaymentStatus::Paid) => Ok(()),
        (_, status) => Err(CoreError::InvalidState(format!(
            "payment captured but booking payment is {}, flagged for review",
            status
        ))),
    }
}

/// Stand-in gateway used when no secret key is configured. Every confirm
/// succeeds locally, with the key tagged so test payments are recognizable.
pub struct TestModeGateway;

#[async_trait]
impl PaymentGateway for TestModeGateway {
    async fn confirm(&self, request: &ConfirmRequest) -> CoreResult<GatewayConfirmation> {
        info!(order_ref = %request.order_ref, "Test mode confirm, gateway not called");
        Ok(GatewayConfirmation {
            transaction_key: format!("TEST_{}", request.transaction_key),
            approved_at: Some(Utc::now()),
        })
    }
}
