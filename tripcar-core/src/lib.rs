pub mod booking;
pub mod vehicle;
pub mod payment;
pub mod repository;
pub mod identity;
pub mod events;

pub use booking::{Booking, BookingStatus, DateRange, PaymentStatus};
pub use vehicle::{Vehicle, VehicleStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch { expected: i64, actual: i64 },
    #[error("Booking is already paid")]
    AlreadyPaid,
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),
    #[error("Internal service error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine-readable code for API bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::Forbidden(_) => "FORBIDDEN",
            CoreError::InvalidState(_) => "INVALID_STATE",
            CoreError::InvalidRange(_) => "INVALID_RANGE",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            CoreError::AlreadyPaid => "ALREADY_PAID",
            CoreError::Unauthenticated => "UNAUTHENTICATED",
            CoreError::PaymentDeclined(_) => "PAYMENT_DECLINED",
            CoreError::Internal(_) => "INTERNAL",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
