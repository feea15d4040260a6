use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tripcar_api::{app, worker, AppState, Backends, Settings};
use tripcar_booking::TestModeGateway;
use tripcar_core::payment::PaymentGateway;
use tripcar_core::repository::DedupStore;
use tripcar_store::app_config::Config;
use tripcar_store::{
    DbClient, EventPublisher, MemoryDedupStore, PgAnomalyRepository, PgBookingRepository,
    PgIdentityDirectory, PgVehicleRepository, RedisClient, TossGateway,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tripcar_api=debug,tripcar_booking=debug,tripcar_store=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting TripCar API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let redis = match &config.redis {
        Some(redis_config) => {
            let client = RedisClient::new(&redis_config.url)
                .await
                .context("Failed to create Redis client")?;
            client.ping().await.context("Failed to reach Redis")?;
            Some(Arc::new(client))
        }
        None => None,
    };
    let dedup: Arc<dyn DedupStore> = match &redis {
        Some(client) => client.clone(),
        None => {
            tracing::warn!("No Redis configured, using in-process dedup store (single instance only)");
            Arc::new(MemoryDedupStore::new())
        }
    };

    let gateway: Arc<dyn PaymentGateway> = match &config.payments.gateway_secret_key {
        Some(secret) => Arc::new(
            TossGateway::new(&config.payments.gateway_base_url, secret)
                .context("Failed to build gateway client")?,
        ),
        None => {
            tracing::warn!("No gateway secret key configured, payments run in test mode");
            Arc::new(TestModeGateway)
        }
    };
    if config.payments.webhook_secret.is_none() {
        tracing::warn!("No webhook secret configured, webhook signatures are not verified");
    }

    let events = Arc::new(EventPublisher::default());
    tokio::spawn(worker::start_event_logger(events.subscribe()));

    let pool = db.pool.clone();
    let backends = Backends {
        vehicles: Arc::new(PgVehicleRepository::new(pool.clone())),
        bookings: Arc::new(PgBookingRepository::new(pool.clone())),
        identities: Arc::new(PgIdentityDirectory::new(pool.clone())),
        anomalies: Arc::new(PgAnomalyRepository::new(pool)),
        dedup,
        gateway,
        events,
        redis,
    };
    let settings = Settings {
        jwt_secret: config.auth.jwt_secret.clone(),
        public_base_url: config.server.public_base_url.clone(),
        webhook_secret: config.payments.webhook_secret.clone(),
        dedup_retention: Duration::from_secs(config.payments.dedup_retention_seconds),
    };
    let app_state = AppState::new(backends, settings).context("Failed to register metrics")?;

    tokio::spawn(worker::start_cascade_sweeper(
        app_state.manager.clone(),
        app_state.metrics.clone(),
        Duration::from_secs(config.booking_rules.cascade_sweep_seconds.max(1)),
    ));

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
