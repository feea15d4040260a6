use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use tripcar_booking::BookingManager;
use tripcar_shared::DomainEvent;

use crate::metrics::Metrics;

/// Re-runs the competing-request rejection for approved bookings, which
/// repairs approvals whose cascade did not finish.
pub async fn start_cascade_sweeper(manager: Arc<BookingManager>, metrics: Arc<Metrics>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Cascade sweeper started, running every {:?}", every);

    loop {
        ticker.tick().await;
        match manager.sweep_competing_pending().await {
            Ok(rejected) => metrics.cascade_sweep_rejections.inc_by(rejected as u64),
            Err(e) => error!("Cascade sweep failed: {}", e),
        }
    }
}

/// Writes every domain event to the log as one JSON line.
pub async fn start_event_logger(mut events: broadcast::Receiver<DomainEvent>) {
    info!("Event logger started");
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => info!(topic = event.topic(), booking_id = %event.booking_id(), "{}", line),
                Err(e) => error!("Failed to encode event: {}", e),
            },
            Err(RecvError::Lagged(skipped)) => warn!("Event logger lagged, {} event(s) dropped", skipped),
            Err(RecvError::Closed) => {
                info!("Event channel closed, logger stopping");
                break;
            }
        }
    }
}
