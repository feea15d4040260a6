use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Method, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod response;
pub mod middleware;
pub mod state;
pub mod bookings;
pub mod payments;
pub mod profile;
pub mod webhooks;
pub mod metrics;
pub mod worker;

pub use state::{AppState, Backends, Settings};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let mut authenticated = Router::new()
        .merge(bookings::routes())
        .merge(payments::routes())
        .merge(profile::routes())
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    // Client traffic only. Gateway webhooks must never see a 429.
    // Needs the connect-info make-service the binary serves with.
    if state.redis.is_some() {
        authenticated = authenticated.layer(from_fn_with_state(state.clone(), rate_limit_middleware));
    }

    Router::new()
        .merge(authenticated)
        .merge(webhooks::routes())
        .route("/metrics", get(metrics::metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, impl IntoResponse> {
    let Some(redis) = &state.redis else {
        return Ok(next.run(req).await);
    };
    let key = format!("ratelimit:{}", addr.ip());

    match redis.check_rate_limit(&key, 100, 60).await {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => Err((StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")),
        Err(e) => {
            // Fail open
            tracing::warn!("Rate limit check failed: {}", e);
            Ok(next.run(req).await)
        }
    }
}
