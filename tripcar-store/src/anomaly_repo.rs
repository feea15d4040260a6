use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use tripcar_core::payment::PaymentAnomaly;
use tripcar_core::repository::AnomalyRepository;
use tripcar_core::{CoreError, CoreResult};

use crate::database::db_error;

pub struct PgAnomalyRepository {
    pool: PgPool,
}

impl PgAnomalyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AnomalyRow {
    id: Uuid,
    booking_id: Uuid,
    order_ref: String,
    transaction_key: String,
    event_kind: String,
    current_status: String,
    reason: String,
    occurred_at: DateTime<Utc>,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<AnomalyRow> for PaymentAnomaly {
    type Error = CoreError;

    fn try_from(row: AnomalyRow) -> Result<Self, Self::Error> {
        Ok(PaymentAnomaly {
            id: row.id,
            booking_id: row.booking_id,
            order_ref: row.order_ref,
            transaction_key: row.transaction_key,
            event_kind: row.event_kind.parse()?,
            current_status: row.current_status.parse()?,
            reason: row.reason,
            occurred_at: row.occurred_at,
            recorded_at: row.recorded_at,
        })
    }
}

#[async_trait]
impl AnomalyRepository for PgAnomalyRepository {
    async fn record_anomaly(&self, anomaly: &PaymentAnomaly) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_anomalies (
                id, booking_id, order_ref, transaction_key, event_kind,
                current_status, reason, occurred_at, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(anomaly.id)
        .bind(anomaly.booking_id)
        .bind(&anomaly.order_ref)
        .bind(&anomaly.transaction_key)
        .bind(anomaly.event_kind.as_str())
        .bind(anomaly.current_status.as_str())
        .bind(&anomaly.reason)
        .bind(anomaly.occurred_at)
        .bind(anomaly.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn list_anomalies(&self, limit: i64) -> CoreResult<Vec<PaymentAnomaly>> {
        let rows = sqlx::query_as::<_, AnomalyRow>(
            r#"
            SELECT id, booking_id, order_ref, transaction_key, event_kind,
                   current_status, reason, occurred_at, recorded_at
            FROM payment_anomalies
            ORDER BY recorded_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(PaymentAnomaly::try_from).collect()
    }
}
