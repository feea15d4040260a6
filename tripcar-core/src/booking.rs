use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;

use crate::{CoreError, CoreResult};

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    /// Edges of the lifecycle graph. Terminal states have none.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Approved)
                | (BookingStatus::Pending, BookingStatus::Rejected)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Approved, BookingStatus::Cancelled)
                | (BookingStatus::Approved, BookingStatus::Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Rejected | BookingStatus::Cancelled | BookingStatus::Completed
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "approved" => Ok(BookingStatus::Approved),
            "rejected" => Ok(BookingStatus::Rejected),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(CoreError::Internal(format!("unknown booking status '{}'", other))),
        }
    }
}

/// Payment status. Only `Unpaid -> Paid` and `Unpaid -> Failed` are valid moves
/// for a single payment attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, PaymentStatus::Unpaid)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(CoreError::Internal(format!("unknown payment status '{}'", other))),
        }
    }
}

/// Half-open rental period `[start, end)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> CoreResult<Self> {
        if end <= start {
            return Err(CoreError::InvalidRange(format!(
                "end {} must be after start {}",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &DateRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// One rental request/agreement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub renter_id: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub total_price: i64,
    pub order_ref: Option<String>,
    pub payment_key: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub pickup_location: Option<String>,
    pub return_location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// New request, always `pending` / `unpaid`.
    pub fn new(
        vehicle_id: Uuid,
        renter_id: String,
        range: DateRange,
        total_price: i64,
        pickup_location: Option<String>,
        return_location: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            vehicle_id,
            renter_id,
            start_at: range.start,
            end_at: range.end,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            total_price,
            order_ref: None,
            payment_key: None,
            approved_at: None,
            pickup_location,
            return_location,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn range(&self) -> DateRange {
        DateRange { start: self.start_at, end: self.end_at }
    }

    pub fn overlaps(&self, other: &Booking) -> bool {
        self.vehicle_id == other.vehicle_id && self.range().overlaps(&other.range())
    }
}

/// Conditional lifecycle update. Applied only when the stored booking is still
/// in `from` (and, when set, in payment status `payment`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: BookingStatus,
    pub to: BookingStatus,
    pub payment: Option<PaymentStatus>,
}

impl Transition {
    pub fn new(from: BookingStatus, to: BookingStatus) -> Self {
        Self { from, to, payment: None }
    }

    pub fn requiring_payment(mut self, payment: PaymentStatus) -> Self {
        self.payment = Some(payment);
        self
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        booking.status == self.from
            && self.payment.map_or(true, |p| booking.payment_status == p)
    }
}

/// Conditional payment update, applied only while the booking is `unpaid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSettlement {
    pub status: PaymentStatus,
    pub payment_key: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}
