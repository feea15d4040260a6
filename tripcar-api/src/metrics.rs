use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::state::AppState;

/// Process-wide counters, registered on a private registry.
pub struct Metrics {
    registry: Registry,
    pub reconciliations: IntCounterVec,
    pub payment_confirms: IntCounterVec,
    pub webhook_deliveries: IntCounterVec,
    pub cascade_failures: IntCounter,
    pub cascade_sweep_rejections: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new("tripcar_reconciliations_total", "Payment events reconciled, by source and outcome"),
            &["source", "outcome"],
        )?;
        let payment_confirms = IntCounterVec::new(
            Opts::new("tripcar_payment_confirms_total", "Confirm calls, by result"),
            &["result"],
        )?;
        let webhook_deliveries = IntCounterVec::new(
            Opts::new("tripcar_webhook_deliveries_total", "Gateway webhook deliveries, by result"),
            &["result"],
        )?;
        let cascade_failures = IntCounter::new(
            "tripcar_cascade_failures_total",
            "Approvals whose competing-request rejection did not finish",
        )?;
        let cascade_sweep_rejections = IntCounter::new(
            "tripcar_cascade_sweep_rejections_total",
            "Competing requests rejected by the background sweep",
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(payment_confirms.clone()))?;
        registry.register(Box::new(webhook_deliveries.clone()))?;
        registry.register(Box::new(cascade_failures.clone()))?;
        registry.register(Box::new(cascade_sweep_rejections.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            payment_confirms,
            webhook_deliveries,
            cascade_failures,
            cascade_sweep_rejections,
        })
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to render metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.webhook_deliveries.with_label_values(&["accepted"]).inc();
        metrics.cascade_failures.inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("tripcar_webhook_deliveries_total{result=\"accepted\"} 1"));
        assert!(text.contains("tripcar_cascade_failures_total 1"));
    }
}
