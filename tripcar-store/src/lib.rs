pub mod app_config;
pub mod database;
pub mod booking_repo;
pub mod vehicle_repo;
pub mod anomaly_repo;
pub mod redis_repo;
pub mod memory;
pub mod events;
pub mod gateway;

pub use database::DbClient;
pub use redis_repo::RedisClient;
pub use events::EventPublisher;
pub use gateway::TossGateway;
pub use memory::{MemoryDedupStore, MemoryStore};
pub use booking_repo::PgBookingRepository;
pub use vehicle_repo::{PgIdentityDirectory, PgVehicleRepository};
pub use anomaly_repo::PgAnomalyRepository;
