use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use tripcar_core::payment::PaymentIntent;
use tripcar_core::repository::{BookingRepository, VehicleRepository};
use tripcar_core::{Booking, BookingStatus, CoreError, CoreResult, PaymentStatus};

/// Issues the descriptor the renter's browser hands to the gateway checkout.
pub struct PaymentIntentIssuer {
    bookings: Arc<dyn BookingRepository>,
    vehicles: Arc<dyn VehicleRepository>,
    public_base_url: String,
}

impl PaymentIntentIssuer {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        vehicles: Arc<dyn VehicleRepository>,
        public_base_url: &str,
    ) -> Self {
        Self {
            bookings,
            vehicles,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Binds a fresh order reference to the booking and returns the intent.
    /// Any reference issued earlier stops resolving.
    pub async fn issue_intent(&self, booking_id: Uuid, renter_id: &str) -> CoreResult<PaymentIntent> {
        let booking = self
            .bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("booking {}", booking_id)))?;
        if booking.renter_id != renter_id {
            return Err(CoreError::Forbidden("only the renter can pay for this booking".to_string()));
        }
        check_payable(&booking)?;

        let order_ref = new_order_ref(booking.id, Utc::now());
        let Some(bound) = self.bookings.bind_order_ref(booking.id, &order_ref).await? else {
            // Paid or moved out of `approved` since the read above.
            let current = self
                .bookings
                .get_booking(booking_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("booking {}", booking_id)))?;
            check_payable(&current)?;
            return Err(CoreError::InvalidState("booking changed while issuing payment".to_string()));
        };

        let order_name = self
            .vehicles
            .get_vehicle(bound.vehicle_id)
            .await?
            .map(|v| v.order_name())
            .unwrap_or_else(|| "Car rental".to_string());

        info!(booking_id = %bound.id, order_ref = %order_ref, amount = bound.total_price, "Payment intent issued");
        Ok(PaymentIntent {
            booking_id: bound.id,
            success_url: self.redirect_url("success", &order_ref, bound.id),
            fail_url: self.redirect_url("fail", &order_ref, bound.id),
            order_ref,
            order_name,
            amount: bound.total_price,
        })
    }

    fn redirect_url(&self, outcome: &str, order_ref: &str, booking_id: Uuid) -> String {
        format!(
            "{}/payments/{}?orderId={}&bookingId={}",
            self.public_base_url, outcome, order_ref, booking_id
        )
    }
}

fn check_payable(booking: &Booking) -> CoreResult<()> {
    if booking.payment_status == PaymentStatus::Paid {
        return Err(CoreError::AlreadyPaid);
    }
    if booking.status != BookingStatus::Approved {
        return Err(CoreError::InvalidState(format!(
            "only approved bookings can be paid, booking is {}",
            booking.status
        )));
    }
    Ok(())
}

/// `ORDER_<booking prefix>_<millis>_<nonce>`, within the gateway's 64 char,
/// `[A-Za-z0-9_-]` order id rules.
fn new_order_ref(booking_id: Uuid, now: DateTime<Utc>) -> String {
    let booking_part = booking_id.simple().to_string();
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "ORDER_{}_{}_{}",
        &booking_part[..20],
        now.timestamp_millis(),
        &nonce[..8]
    )
}
