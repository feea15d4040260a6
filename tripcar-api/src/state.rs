use std::sync::Arc;
use std::time::Duration;

use tripcar_booking::{BookingManager, BookingQueries, PaymentIntentIssuer, PaymentOrchestrator, PaymentReconciler};
use tripcar_core::identity::IdentityDirectory;
use tripcar_core::payment::PaymentGateway;
use tripcar_core::repository::{AnomalyRepository, BookingRepository, DedupStore, VehicleRepository};
use tripcar_store::{EventPublisher, RedisClient};

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

/// Storage and gateway implementations the services run on.
pub struct Backends {
    pub vehicles: Arc<dyn VehicleRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub identities: Arc<dyn IdentityDirectory>,
    pub anomalies: Arc<dyn AnomalyRepository>,
    pub dedup: Arc<dyn DedupStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub events: Arc<EventPublisher>,
    /// Enables per-IP rate limiting when present.
    pub redis: Option<Arc<RedisClient>>,
}

pub struct Settings {
    pub jwt_secret: String,
    pub public_base_url: String,
    pub webhook_secret: Option<String>,
    pub dedup_retention: Duration,
}

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<BookingManager>,
    pub issuer: Arc<PaymentIntentIssuer>,
    pub reconciler: Arc<PaymentReconciler>,
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub queries: Arc<BookingQueries>,
    pub anomalies: Arc<dyn AnomalyRepository>,
    pub events: Arc<EventPublisher>,
    pub redis: Option<Arc<RedisClient>>,
    pub metrics: Arc<Metrics>,
    pub auth: AuthConfig,
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(backends: Backends, settings: Settings) -> Result<Self, prometheus::Error> {
        let manager = BookingManager::new(
            backends.vehicles.clone(),
            backends.bookings.clone(),
            backends.events.clone(),
        );
        let issuer = PaymentIntentIssuer::new(
            backends.bookings.clone(),
            backends.vehicles.clone(),
            &settings.public_base_url,
        );
        let reconciler = Arc::new(PaymentReconciler::new(
            backends.bookings.clone(),
            backends.anomalies.clone(),
            backends.dedup,
            backends.events.clone(),
            settings.dedup_retention,
        ));
        let orchestrator = PaymentOrchestrator::new(backends.gateway, reconciler.clone(), backends.bookings.clone());
        let queries = BookingQueries::new(backends.bookings, backends.vehicles, backends.identities);

        Ok(Self {
            manager: Arc::new(manager),
            issuer: Arc::new(issuer),
            reconciler,
            orchestrator: Arc::new(orchestrator),
            queries: Arc::new(queries),
            anomalies: backends.anomalies,
            events: backends.events,
            redis: backends.redis,
            metrics: Arc::new(Metrics::new()?),
            auth: AuthConfig { secret: settings.jwt_secret },
            webhook_secret: settings.webhook_secret,
        })
    }
}
