use async_trait::async_trait;
use uuid::Uuid;
use std::time::Duration;

use crate::booking::{Booking, BookingStatus, DateRange, PaymentSettlement, Transition};
use crate::payment::PaymentAnomaly;
use crate::vehicle::Vehicle;
use crate::CoreResult;

/// Read access to the vehicle catalog
#[async_trait]
pub trait VehicleRepository: Send + Sync {
    async fn get_vehicle(&self, id: Uuid) -> CoreResult<Option<Vehicle>>;

    async fn count_vehicles_by_owner(&self, owner_id: &str) -> CoreResult<u64>;
}

/// Booking persistence. Every mutating method is a single conditional write:
/// it returns `Ok(None)` when the stored row no longer satisfies its guard.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Fails with `Conflict` if the row would break the no-overlap constraint.
    async fn insert_booking(&self, booking: &Booking) -> CoreResult<()>;

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>>;

    async fn find_by_order_ref(&self, order_ref: &str) -> CoreResult<Option<Booking>>;

    /// Bookings of `vehicle_id` in `status` whose range overlaps `range`.
    async fn list_overlapping(
        &self,
        vehicle_id: Uuid,
        range: &DateRange,
        status: BookingStatus,
    ) -> CoreResult<Vec<Booking>>;

    async fn list_by_renter(&self, renter_id: &str) -> CoreResult<Vec<Booking>>;

    /// Bookings on any vehicle owned by `owner_id`, newest first.
    async fn list_by_owner(&self, owner_id: &str) -> CoreResult<Vec<Booking>>;

    /// Approved bookings that still have an overlapping pending competitor.
    async fn list_approved_with_pending_competitors(&self) -> CoreResult<Vec<Booking>>;

    /// Moving into `approved` fails with `Conflict` when another approved
    /// booking on the vehicle overlaps.
    async fn transition(&self, id: Uuid, transition: &Transition) -> CoreResult<Option<Booking>>;

    /// Rejects every other pending booking on the vehicle overlapping `approved`.
    /// Returns the ids it rejected; re-running it is a no-op.
    async fn reject_competing_pending(&self, approved: &Booking) -> CoreResult<Vec<Uuid>>;

    /// Binds a fresh order reference to an approved, not yet paid booking. A
    /// `failed` payment is reset to `unpaid` for the new attempt.
    async fn bind_order_ref(&self, id: Uuid, order_ref: &str) -> CoreResult<Option<Booking>>;

    /// Applies `settlement` only while the payment is `unpaid`; moving to `paid`
    /// additionally requires the booking to be `approved`.
    async fn settle_payment(
        &self,
        id: Uuid,
        settlement: &PaymentSettlement,
    ) -> CoreResult<Option<Booking>>;
}

/// Time-windowed record of processed payment events.
#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn recall(&self, key: &str) -> CoreResult<Option<String>>;

    /// Stores `value` under `key` unless present. Returns whatever is stored
    /// afterwards, so concurrent writers agree on the first value.
    async fn remember(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<String>;
}

#[async_trait]
pub trait AnomalyRepository: Send + Sync {
    async fn record_anomaly(&self, anomaly: &PaymentAnomaly) -> CoreResult<()>;

    async fn list_anomalies(&self, limit: i64) -> CoreResult<Vec<PaymentAnomaly>>;
}
