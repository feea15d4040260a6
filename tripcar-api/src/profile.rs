use axum::{extract::State, routing::get, Extension, Json, Router};

use tripcar_booking::queries::{BookingView, ProfileStats};

use crate::error::AppError;
use crate::middleware::Claims;
use crate::response::{ok, ApiResponse};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/me/orders", get(my_orders))
        .route("/v1/me/stats", get(profile_stats))
}

/// GET /v1/me/orders
/// Paid bookings of the caller
async fn my_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<Vec<BookingView>>>, AppError> {
    Ok(ok(state.queries.my_orders(&claims.sub).await?))
}

async fn profile_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<ProfileStats>>, AppError> {
    Ok(ok(state.queries.profile_stats(&claims.sub).await?))
}
