use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;
use tripcar_core::CoreError;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Postgres SQLSTATE for an EXCLUDE constraint violation.
const EXCLUSION_VIOLATION: &str = "23P01";
const UNIQUE_VIOLATION: &str = "23505";

/// Maps driver errors onto the core taxonomy. The overlap exclusion constraint
/// is the authoritative double-booking signal.
pub(crate) fn db_error(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some(EXCLUSION_VIOLATION) => {
                return CoreError::Conflict("overlapping approved booking".to_string());
            }
            Some(UNIQUE_VIOLATION) => {
                return CoreError::Conflict(db.message().to_string());
            }
            _ => {}
        }
    }
    tracing::error!(error = %err, "database error");
    CoreError::Internal(err.to_string())
}
