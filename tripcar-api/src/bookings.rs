use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use tripcar_booking::manager::ApprovalOutcome;
use tripcar_booking::queries::{BookingDetail, BookingView, ReceivedBooking};
use tripcar_booking::NewBooking;
use tripcar_core::Booking;

use crate::error::AppError;
use crate::middleware::Claims;
use crate::response::{ok, ok_with_warnings, ApiResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub vehicle_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub pickup_location: Option<String>,
    pub return_location: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/mine", get(my_bookings))
        .route("/v1/bookings/received", get(received_bookings))
        .route("/v1/bookings/{id}", get(booking_detail))
        .route("/v1/bookings/{id}/approve", post(approve_booking))
        .route("/v1/bookings/{id}/reject", post(reject_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/bookings/{id}/complete", post(complete_booking))
}

/// POST /v1/bookings
async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Booking>>), AppError> {
    let booking = state
        .manager
        .create(NewBooking {
            vehicle_id: req.vehicle_id,
            renter_id: claims.sub,
            start: req.start_at,
            end: req.end_at,
            pickup_location: req.pickup_location,
            return_location: req.return_location,
        })
        .await?;
    Ok((StatusCode::CREATED, ok(booking)))
}

/// POST /v1/bookings/{id}/approve
async fn approve_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ApprovalOutcome>>, AppError> {
    let outcome = state.manager.approve(id, &claims.sub).await?;
    if !outcome.warnings.is_empty() {
        state.metrics.cascade_failures.inc();
    }
    info!(booking_id = %id, auto_rejected = outcome.auto_rejected.len(), "Booking approved");
    let warnings = outcome.warnings.clone();
    Ok(ok_with_warnings(outcome, warnings))
}

async fn reject_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    Ok(ok(state.manager.reject(id, &claims.sub).await?))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    Ok(ok(state.manager.cancel(id, &claims.sub).await?))
}

async fn complete_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    Ok(ok(state.manager.complete(id, &claims.sub).await?))
}

async fn my_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<Vec<BookingView>>>, AppError> {
    Ok(ok(state.queries.my_bookings(&claims.sub).await?))
}

async fn received_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<Vec<ReceivedBooking>>>, AppError> {
    Ok(ok(state.queries.received_bookings(&claims.sub).await?))
}

async fn booking_detail(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<BookingDetail>>, AppError> {
    Ok(ok(state.queries.booking_detail(id, &claims.sub).await?))
}
