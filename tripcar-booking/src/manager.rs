use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use tripcar_core::booking::Transition;
use tripcar_core::events::EventSink;
use tripcar_core::repository::{BookingRepository, VehicleRepository};
use tripcar_core::{Booking, BookingStatus, CoreError, CoreResult, DateRange, PaymentStatus, Vehicle};
use tripcar_shared::models::events::{BookingCreatedEvent, BookingStatusChangedEvent};
use tripcar_shared::DomainEvent;

use crate::availability::AvailabilityChecker;
use crate::pricing;

/// Renter's rental request.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub vehicle_id: Uuid,
    pub renter_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub pickup_location: Option<String>,
    pub return_location: Option<String>,
}

/// Result of an approval. The approval itself always stands; `warnings`
/// reports a cascade that did not finish.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalOutcome {
    pub booking: Booking,
    pub auto_rejected: Vec<Uuid>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Owns the booking state machine
pub struct BookingManager {
    vehicles: Arc<dyn VehicleRepository>,
    bookings: Arc<dyn BookingRepository>,
    availability: AvailabilityChecker,
    events: Arc<dyn EventSink>,
}

impl BookingManager {
    pub fn new(
        vehicles: Arc<dyn VehicleRepository>,
        bookings: Arc<dyn BookingRepository>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let availability = AvailabilityChecker::new(bookings.clone());
        Self { vehicles, bookings, availability, events }
    }

    /// Create a `pending` / `unpaid` request
    pub async fn create(&self, request: NewBooking) -> CoreResult<Booking> {
        let range = DateRange::new(request.start, request.end)?;
        let vehicle = self.load_vehicle(request.vehicle_id).await?;

        if vehicle.owner_id == request.renter_id {
            return Err(CoreError::Forbidden("owners cannot book their own vehicle".to_string()));
        }
        if !vehicle.is_listable() {
            return Err(CoreError::InvalidState(format!("vehicle {} is not listable", vehicle.id)));
        }
        if !vehicle.availability_window().contains(&range) {
            return Err(CoreError::InvalidRange(
                "requested range is outside the vehicle's availability window".to_string(),
            ));
        }
        if !self.availability.is_range_available(vehicle.id, &range, None).await? {
            return Err(CoreError::Conflict("vehicle is already booked for these dates".to_string()));
        }

        let total_price = pricing::total_price(&range, vehicle.daily_rate)?;
        let booking = Booking::new(
            vehicle.id,
            request.renter_id,
            range,
            total_price,
            request.pickup_location,
            request.return_location,
        );
        self.bookings.insert_booking(&booking).await?;

        info!(booking_id = %booking.id, vehicle_id = %vehicle.id, total_price, "Booking requested");
        self.events.publish(DomainEvent::BookingCreated(BookingCreatedEvent {
            booking_id: booking.id,
            vehicle_id: booking.vehicle_id,
            renter_id: booking.renter_id.clone(),
            total_price: booking.total_price,
            timestamp: Utc::now().timestamp(),
        }));
        Ok(booking)
    }

    /// Transition: Pending → Approved, then reject overlapping pending requests
    pub async fn approve(&self, booking_id: Uuid, owner_id: &str) -> CoreResult<ApprovalOutcome> {
        let booking = self.load_owned(booking_id, owner_id).await?;
        self.require_status(&booking, BookingStatus::Pending, BookingStatus::Approved)?;

        if !self
            .availability
            .is_range_available(booking.vehicle_id, &booking.range(), Some(booking.id))
            .await?
        {
            return Err(CoreError::Conflict("another approved booking overlaps these dates".to_string()));
        }

        let approved = self
            .apply(&booking, Transition::new(BookingStatus::Pending, BookingStatus::Approved), Some(owner_id))
            .await?;

        // Second phase. A failure here leaves the approval in place; the
        // background sweep finishes the job.
        let mut warnings = Vec::new();
        let auto_rejected = match self.reject_competing(&approved).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(booking_id = %approved.id, error = %e, "Cascade rejection failed");
                warnings.push(format!("competing requests were not all rejected: {}", e));
                Vec::new()
            }
        };

        Ok(ApprovalOutcome { booking: approved, auto_rejected, warnings })
    }

    /// Transition: Pending → Rejected
    pub async fn reject(&self, booking_id: Uuid, owner_id: &str) -> CoreResult<Booking> {
        let booking = self.load_owned(booking_id, owner_id).await?;
        self.require_status(&booking, BookingStatus::Pending, BookingStatus::Rejected)?;
        self.apply(&booking, Transition::new(BookingStatus::Pending, BookingStatus::Rejected), Some(owner_id))
            .await
    }

    /// Renter withdraws a pending or approved booking that has not been paid
    pub async fn cancel(&self, booking_id: Uuid, renter_id: &str) -> CoreResult<Booking> {
        let booking = self.load_booking(booking_id).await?;
        if booking.renter_id != renter_id {
            return Err(CoreError::Forbidden("only the renter can cancel this booking".to_string()));
        }
        if !booking.status.can_transition_to(BookingStatus::Cancelled) {
            return Err(invalid_transition(&booking, BookingStatus::Cancelled));
        }
        if booking.payment_status == PaymentStatus::Paid {
            return Err(CoreError::InvalidState("a paid booking cannot be cancelled".to_string()));
        }

        // Guarded on the payment status we just read, so a payment landing
        // in between makes the cancel miss instead of overriding it.
        let transition = Transition::new(booking.status, BookingStatus::Cancelled)
            .requiring_payment(booking.payment_status);
        self.apply(&booking, transition, Some(renter_id)).await
    }

    /// Transition: Approved + paid → Completed
    pub async fn complete(&self, booking_id: Uuid, owner_id: &str) -> CoreResult<Booking> {
        let booking = self.load_owned(booking_id, owner_id).await?;
        self.require_status(&booking, BookingStatus::Approved, BookingStatus::Completed)?;
        if booking.payment_status != PaymentStatus::Paid {
            return Err(CoreError::InvalidState("only a paid booking can be completed".to_string()));
        }
        let transition = Transition::new(BookingStatus::Approved, BookingStatus::Completed)
            .requiring_payment(PaymentStatus::Paid);
        self.apply(&booking, transition, Some(owner_id)).await
    }

    /// Rejects pending bookings overlapping `approved`. Safe to re-run.
    pub async fn reject_competing(&self, approved: &Booking) -> CoreResult<Vec<Uuid>> {
        let rejected = self.bookings.reject_competing_pending(approved).await?;
        let now = Utc::now().timestamp();
        for id in &rejected {
            info!(booking_id = %id, approved_id = %approved.id, "Auto-rejected competing request");
            self.events.publish(DomainEvent::BookingStatusChanged(BookingStatusChangedEvent {
                booking_id: *id,
                vehicle_id: approved.vehicle_id,
                from: BookingStatus::Pending.to_string(),
                to: BookingStatus::Rejected.to_string(),
                actor_id: None,
                timestamp: now,
            }));
        }
        Ok(rejected)
    }

    /// Re-runs the cascade for every approved booking that still has an
    /// overlapping pending competitor. Returns how many requests it rejected.
    pub async fn sweep_competing_pending(&self) -> CoreResult<usize> {
        let approved = self.bookings.list_approved_with_pending_competitors().await?;
        let mut total = 0;
        for booking in &approved {
            match self.reject_competing(booking).await {
                Ok(ids) => total += ids.len(),
                Err(e) => warn!(booking_id = %booking.id, error = %e, "Cascade sweep failed for booking"),
            }
        }
        if total > 0 {
            info!("Cascade sweep rejected {} competing request(s)", total);
        }
        Ok(total)
    }

    async fn load_booking(&self, booking_id: Uuid) -> CoreResult<Booking> {
        self.bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("booking {}", booking_id)))
    }

    async fn load_vehicle(&self, vehicle_id: Uuid) -> CoreResult<Vehicle> {
        self.vehicles
            .get_vehicle(vehicle_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("vehicle {}", vehicle_id)))
    }

    /// Loads the booking and checks `owner_id` owns its vehicle.
    async fn load_owned(&self, booking_id: Uuid, owner_id: &str) -> CoreResult<Booking> {
        let booking = self.load_booking(booking_id).await?;
        let vehicle = self.load_vehicle(booking.vehicle_id).await?;
        if vehicle.owner_id != owner_id {
            return Err(CoreError::Forbidden("only the vehicle owner can do this".to_string()));
        }
        Ok(booking)
    }

    fn require_status(&self, booking: &Booking, from: BookingStatus, to: BookingStatus) -> CoreResult<()> {
        if booking.status != from {
            return Err(invalid_transition(booking, to));
        }
        Ok(())
    }

    async fn apply(&self, booking: &Booking, transition: Transition, actor: Option<&str>) -> CoreResult<Booking> {
        let Some(updated) = self.bookings.transition(booking.id, &transition).await? else {
            // Lost a race with another writer. Report against what is stored now.
            let current = self.load_booking(booking.id).await?;
            return Err(invalid_transition(&current, transition.to));
        };

        info!(booking_id = %updated.id, from = %transition.from, to = %transition.to, "Booking transitioned");
        self.events.publish(DomainEvent::BookingStatusChanged(BookingStatusChangedEvent {
            booking_id: updated.id,
            vehicle_id: updated.vehicle_id,
            from: transition.from.to_string(),
            to: transition.to.to_string(),
            actor_id: actor.map(str::to_string),
            timestamp: Utc::now().timestamp(),
        }));
        Ok(updated)
    }
}

fn invalid_transition(booking: &Booking, to: BookingStatus) -> CoreError {
    CoreError::InvalidState(format!(
        "cannot move booking {} from {} ({}) to {}",
        booking.id, booking.status, booking.payment_status, to
    ))
}
