use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use tripcar_core::repository::BookingRepository;
use tripcar_core::{BookingStatus, CoreResult, DateRange};

/// Fast-path overlap check. The persistence layer's exclusion constraint is
/// the real guard; this only lets callers fail early with a clean `Conflict`.
#[derive(Clone)]
pub struct AvailabilityChecker {
    bookings: Arc<dyn BookingRepository>,
}

impl AvailabilityChecker {
    pub fn new(bookings: Arc<dyn BookingRepository>) -> Self {
        Self { bookings }
    }

    /// True when no approved booking of `vehicle_id` overlaps `[start, end)`.
    /// `exclude` skips one booking, for re-validating an existing one.
    pub async fn is_available(
        &self,
        vehicle_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> CoreResult<bool> {
        let range = DateRange::new(start, end)?;
        self.is_range_available(vehicle_id, &range, exclude).await
    }

    pub async fn is_range_available(
        &self,
        vehicle_id: Uuid,
        range: &DateRange,
        exclude: Option<Uuid>,
    ) -> CoreResult<bool> {
        let blocking = self
            .bookings
            .list_overlapping(vehicle_id, range, BookingStatus::Approved)
            .await?;
        Ok(!blocking.iter().any(|b| Some(b.id) != exclude))
    }
}
