use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use tripcar_booking::queries::PaymentInfo;
use tripcar_booking::{ConfirmedPayment, Reconciliation};
use tripcar_core::payment::{PaymentAnomaly, PaymentIntent};
use tripcar_core::CoreError;

use crate::error::AppError;
use crate::middleware::Claims;
use crate::response::{ok, ApiResponse};
use crate::state::AppState;

/// Body of the confirm call made after the gateway's success redirect. The
/// gateway's own field names are accepted as aliases.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    #[serde(alias = "paymentKey")]
    pub transaction_key: String,
    #[serde(alias = "orderId")]
    pub order_ref: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailureRequest {
    #[serde(alias = "orderId")]
    pub order_ref: String,
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AnomalyQuery {
    pub limit: Option<i64>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings/{id}/payment-intent", post(issue_intent))
        .route("/v1/bookings/{id}/payment", get(payment_info))
        .route("/v1/payments/confirm", post(confirm_payment))
        .route("/v1/payments/failure", post(report_failure))
        .route("/v1/payments/anomalies", get(list_anomalies))
}

/// POST /v1/bookings/{id}/payment-intent
async fn issue_intent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentIntent>>, AppError> {
    Ok(ok(state.issuer.issue_intent(id, &claims.sub).await?))
}

/// POST /v1/payments/confirm
async fn confirm_payment(
    State(state): State<AppState>,
    Json(req): Json<ConfirmPaymentRequest>,
) -> Result<Json<ApiResponse<ConfirmedPayment>>, AppError> {
    let result = state
        .orchestrator
        .confirm_payment(&req.transaction_key, &req.order_ref, req.amount)
        .await;

    let label = match &result {
        Ok(_) => "paid".to_string(),
        Err(e) => e.code().to_lowercase(),
    };
    state.metrics.payment_confirms.with_label_values(&[label.as_str()]).inc();

    Ok(ok(result?))
}

/// POST /v1/payments/failure
/// Called from the gateway's fail redirect
async fn report_failure(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PaymentFailureRequest>,
) -> Result<Json<ApiResponse<Reconciliation>>, AppError> {
    let reconciliation = state
        .orchestrator
        .report_failure(&req.order_ref, &claims.sub, &req.code, &req.message)
        .await?;
    state
        .metrics
        .reconciliations
        .with_label_values(&["client_failure", reconciliation.outcome.as_str()])
        .inc();
    Ok(ok(reconciliation))
}

async fn payment_info(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentInfo>>, AppError> {
    Ok(ok(state.queries.payment_info(id, &claims.sub).await?))
}

/// GET /v1/payments/anomalies
/// Manual review queue, admins only
async fn list_anomalies(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<AnomalyQuery>,
) -> Result<Json<ApiResponse<Vec<PaymentAnomaly>>>, AppError> {
    if !claims.is_admin() {
        return Err(CoreError::Forbidden("admin role required".to_string()).into());
    }
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    Ok(ok(state.anomalies.list_anomalies(limit).await?))
}
