use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::booking::PaymentStatus;
use crate::{CoreError, CoreResult};

/// Kind of a gateway notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentEventKind {
    Completed,
    Canceled,
    PartiallyCanceled,
    AwaitingDeposit,
    Expired,
    Aborted,
}

impl PaymentEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentEventKind::Completed => "completed",
            PaymentEventKind::Canceled => "canceled",
            PaymentEventKind::PartiallyCanceled => "partially-canceled",
            PaymentEventKind::AwaitingDeposit => "awaiting-deposit",
            PaymentEventKind::Expired => "expired",
            PaymentEventKind::Aborted => "aborted",
        }
    }

    /// Payment status this event drives a booking to, `None` for informational kinds.
    pub fn target_status(&self) -> Option<PaymentStatus> {
        match self {
            PaymentEventKind::Completed => Some(PaymentStatus::Paid),
            PaymentEventKind::Canceled
            | PaymentEventKind::PartiallyCanceled
            | PaymentEventKind::Expired
            | PaymentEventKind::Aborted => Some(PaymentStatus::Failed),
            PaymentEventKind::AwaitingDeposit => None,
        }
    }
}

impl fmt::Display for PaymentEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentEventKind {
    type Err = CoreError;

    /// Accepts both our names and the gateway's native status codes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" | "DONE" => Ok(PaymentEventKind::Completed),
            "canceled" | "CANCELED" => Ok(PaymentEventKind::Canceled),
            "partially-canceled" | "PARTIAL_CANCELED" => Ok(PaymentEventKind::PartiallyCanceled),
            "awaiting-deposit" | "WAITING_FOR_DEPOSIT" => Ok(PaymentEventKind::AwaitingDeposit),
            "expired" | "EXPIRED" => Ok(PaymentEventKind::Expired),
            "aborted" | "ABORTED" => Ok(PaymentEventKind::Aborted),
            other => Err(CoreError::InvalidState(format!("unsupported payment event '{}'", other))),
        }
    }
}

/// One inbound notification about a payment, from the confirm call or a webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    pub order_ref: String,
    pub transaction_key: String,
    pub kind: PaymentEventKind,
    /// `None` when the notification carries no amount (some webhook deliveries).
    pub amount: Option<i64>,
    pub occurred_at: DateTime<Utc>,
    /// Gateway's own approval time, when it sent one.
    pub approved_at: Option<DateTime<Utc>>,
}

impl PaymentEvent {
    pub fn dedup_key(&self) -> String {
        format!(
            "payment-event:{}:{}:{}",
            self.transaction_key,
            self.kind.as_str(),
            self.occurred_at.timestamp_micros()
        )
    }

    /// Canonical approval timestamp: gateway approval time, else occurrence time.
    pub fn approval_timestamp(&self) -> DateTime<Utc> {
        self.approved_at.unwrap_or(self.occurred_at)
    }
}

/// Parses the timestamp formats the gateway emits: RFC 3339 with offset, or a
/// naive ISO datetime which is read as UTC.
pub fn parse_gateway_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Gateway-facing descriptor for one checkout attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub booking_id: Uuid,
    pub order_ref: String,
    pub order_name: String,
    pub amount: i64,
    pub success_url: String,
    pub fail_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmRequest {
    pub transaction_key: String,
    pub order_ref: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfirmation {
    /// Key to stamp on the booking, may differ from the request in test mode.
    pub transaction_key: String,
    pub approved_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Ask the gateway to capture a checkout the customer just completed.
    /// A gateway refusal is `CoreError::PaymentDeclined`.
    async fn confirm(&self, request: &ConfirmRequest) -> CoreResult<GatewayConfirmation>;
}

/// A signal that could not be applied without breaking payment monotonicity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentAnomaly {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub order_ref: String,
    pub transaction_key: String,
    pub event_kind: PaymentEventKind,
    pub current_status: PaymentStatus,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}
