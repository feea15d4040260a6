use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use tripcar_core::identity::{Contact, IdentityDirectory};
use tripcar_core::repository::VehicleRepository;
use tripcar_core::{CoreResult, Vehicle};
use tripcar_shared::Masked;

use crate::database::db_error;

pub struct PgVehicleRepository {
    pool: PgPool,
}

impl PgVehicleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct VehicleRow {
    id: Uuid,
    owner_id: String,
    model: String,
    plate_number: String,
    daily_rate: i64,
    status: String,
    available_from: DateTime<Utc>,
    available_until: DateTime<Utc>,
    airport_location: String,
}

impl TryFrom<VehicleRow> for Vehicle {
    type Error = tripcar_core::CoreError;

    fn try_from(row: VehicleRow) -> Result<Self, Self::Error> {
        Ok(Vehicle {
            id: row.id,
            owner_id: row.owner_id,
            model: row.model,
            plate_number: row.plate_number,
            daily_rate: row.daily_rate,
            status: row.status.parse()?,
            available_from: row.available_from,
            available_until: row.available_until,
            airport_location: row.airport_location,
        })
    }
}

#[async_trait]
impl VehicleRepository for PgVehicleRepository {
    async fn get_vehicle(&self, id: Uuid) -> CoreResult<Option<Vehicle>> {
        let row = sqlx::query_as::<_, VehicleRow>(
            r#"
            SELECT id, owner_id, model, plate_number, daily_rate, status,
                   available_from, available_until, airport_location
            FROM vehicles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(Vehicle::try_from).transpose()
    }

    async fn count_vehicles_by_owner(&self, owner_id: &str) -> CoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vehicles WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count.max(0) as u64)
    }
}

/// Contact lookup over the `users` table synced from the identity provider.
pub struct PgIdentityDirectory {
    pool: PgPool,
}

impl PgIdentityDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityDirectory for PgIdentityDirectory {
    async fn get_contact(&self, user_id: &str) -> CoreResult<Option<Contact>> {
        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT name, phone FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        Ok(row.map(|(name, phone)| Contact { name, phone: phone.map(Masked) }))
    }
}
