use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};

use tripcar_core::payment::{parse_gateway_timestamp, PaymentEvent, PaymentEventKind};
use tripcar_core::CoreError;

use crate::error::AppError;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-tosspayments-signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWebhook {
    pub event_type: String,
    pub created_at: String,
    pub data: PaymentWebhookData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWebhookData {
    /// Gateway-native key. Deliveries may carry it next to `transactionKey`.
    pub payment_key: Option<String>,
    pub transaction_key: Option<String>,
    pub order_id: Option<String>,
    pub order_ref: Option<String>,
    pub status: Option<String>,
    pub approved_at: Option<String>,
    pub total_amount: Option<i64>,
    pub cancels: Option<serde_json::Value>,
}

impl PaymentWebhook {
    /// Kind comes from `data.status`, falling back to `eventType`. The event
    /// is keyed by `paymentKey`, else `transactionKey`.
    pub fn into_event(self) -> Result<PaymentEvent, String> {
        let transaction_key = self
            .data
            .payment_key
            .or(self.data.transaction_key)
            .ok_or("missing paymentKey")?;
        let order_ref = self.data.order_id.or(self.data.order_ref).ok_or("missing orderId")?;
        let kind = self
            .data
            .status
            .as_deref()
            .and_then(|s| s.parse::<PaymentEventKind>().ok())
            .or_else(|| self.event_type.parse().ok())
            .ok_or_else(|| {
                format!(
                    "unsupported event '{}' with status {:?}",
                    self.event_type, self.data.status
                )
            })?;
        let occurred_at = parse_gateway_timestamp(&self.created_at)
            .ok_or_else(|| format!("unreadable createdAt '{}'", self.created_at))?;

        Ok(PaymentEvent {
            order_ref,
            transaction_key,
            kind,
            amount: self.data.total_amount,
            occurred_at,
            approved_at: self.data.approved_at.as_deref().and_then(parse_gateway_timestamp),
        })
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/payment", post(handle_payment_webhook).get(webhook_health))
}

/// Base64 HMAC-SHA256 of the raw body. A `v1:` scheme prefix is tolerated.
pub fn sign_body(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

fn verify_signature(secret: &str, body: &[u8], provided: Option<&str>) -> bool {
    let Some(provided) = provided else {
        return false;
    };
    let provided = provided.trim();
    let provided = provided.strip_prefix("v1:").unwrap_or(provided);
    let Some(expected) = sign_body(secret, body) else {
        return false;
    };
    expected.as_bytes().ct_eq(provided.as_bytes()).unwrap_u8() == 1
}

/// GET /webhooks/payment
async fn webhook_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "active" }))
}

/// POST /webhooks/payment
/// Answers 200 whenever redelivery would not help, so the gateway stops
/// retrying. Storage failures return 500 so it does retry.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let deliveries = &state.metrics.webhook_deliveries;

    if let Some(secret) = &state.webhook_secret {
        let provided = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        if !verify_signature(secret, &body, provided) {
            warn!("Webhook rejected: bad or missing signature");
            deliveries.with_label_values(&["rejected_signature"]).inc();
            return AppError::InvalidSignature.into_response();
        }
    }

    let event = match serde_json::from_slice::<PaymentWebhook>(&body)
        .map_err(|e| e.to_string())
        .and_then(PaymentWebhook::into_event)
    {
        Ok(event) => event,
        Err(reason) => {
            warn!("Ignoring unprocessable webhook: {}", reason);
            deliveries.with_label_values(&["ignored"]).inc();
            return acknowledge("ignored", None);
        }
    };

    info!(order_ref = %event.order_ref, kind = %event.kind, "Received payment webhook");
    match state.reconciler.reconcile(&event).await {
        Ok(reconciliation) => {
            deliveries.with_label_values(&["accepted"]).inc();
            state
                .metrics
                .reconciliations
                .with_label_values(&["webhook", reconciliation.outcome.as_str()])
                .inc();
            (StatusCode::OK, Json(json!({ "success": true, "data": reconciliation }))).into_response()
        }
        Err(CoreError::Internal(msg)) => {
            error!(order_ref = %event.order_ref, "Webhook processing failed: {}", msg);
            deliveries.with_label_values(&["failed"]).inc();
            AppError::Core(CoreError::Internal(msg)).into_response()
        }
        Err(e) => {
            warn!(order_ref = %event.order_ref, code = e.code(), "Webhook absorbed: {}", e);
            deliveries.with_label_values(&["absorbed"]).inc();
            acknowledge("absorbed", Some(e.code()))
        }
    }
}

fn acknowledge(result: &str, code: Option<&str>) -> Response {
    (StatusCode::OK, Json(json!({ "success": true, "result": result, "code": code }))).into_response()
}
