use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use tripcar_core::booking::{PaymentSettlement, Transition};
use tripcar_core::repository::BookingRepository;
use tripcar_core::{Booking, BookingStatus, CoreError, CoreResult, DateRange};

use crate::database::db_error;

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const COLUMNS: &str = "b.id, b.vehicle_id, b.renter_id, b.start_at, b.end_at, b.status, \
    b.payment_status, b.total_price, b.order_ref, b.payment_key, b.approved_at, \
    b.pickup_location, b.return_location, b.created_at, b.updated_at";

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    vehicle_id: Uuid,
    renter_id: String,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    status: String,
    payment_status: String,
    total_price: i64,
    order_ref: Option<String>,
    payment_key: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    pickup_location: Option<String>,
    return_location: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            vehicle_id: row.vehicle_id,
            renter_id: row.renter_id,
            start_at: row.start_at,
            end_at: row.end_at,
            status: row.status.parse()?,
            payment_status: row.payment_status.parse()?,
            total_price: row.total_price,
            order_ref: row.order_ref,
            payment_key: row.payment_key,
            approved_at: row.approved_at,
            pickup_location: row.pickup_location,
            return_location: row.return_location,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_bookings(rows: Vec<BookingRow>) -> CoreResult<Vec<Booking>> {
    rows.into_iter().map(Booking::try_from).collect()
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert_booking(&self, booking: &Booking) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, vehicle_id, renter_id, start_at, end_at, status, payment_status,
                total_price, order_ref, payment_key, approved_at,
                pickup_location, return_location, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(booking.id)
        .bind(booking.vehicle_id)
        .bind(&booking.renter_id)
        .bind(booking.start_at)
        .bind(booking.end_at)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.total_price)
        .bind(&booking.order_ref)
        .bind(&booking.payment_key)
        .bind(booking.approved_at)
        .bind(&booking.pickup_location)
        .bind(&booking.return_location)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        let sql = format!("SELECT {COLUMNS} FROM bookings b WHERE b.id = $1");
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn find_by_order_ref(&self, order_ref: &str) -> CoreResult<Option<Booking>> {
        let sql = format!("SELECT {COLUMNS} FROM bookings b WHERE b.order_ref = $1");
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(order_ref)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn list_overlapping(
        &self,
        vehicle_id: Uuid,
        range: &DateRange,
        status: BookingStatus,
    ) -> CoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM bookings b \
             WHERE b.vehicle_id = $1 AND b.status = $2 AND b.start_at < $4 AND $3 < b.end_at \
             ORDER BY b.start_at"
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(vehicle_id)
            .bind(status.as_str())
            .bind(range.start)
            .bind(range.end)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        into_bookings(rows)
    }

    async fn list_by_renter(&self, renter_id: &str) -> CoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM bookings b WHERE b.renter_id = $1 ORDER BY b.created_at DESC"
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(renter_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        into_bookings(rows)
    }

    async fn list_by_owner(&self, owner_id: &str) -> CoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM bookings b JOIN vehicles v ON v.id = b.vehicle_id \
             WHERE v.owner_id = $1 ORDER BY b.created_at DESC"
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        into_bookings(rows)
    }

    async fn list_approved_with_pending_competitors(&self) -> CoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM bookings b \
             WHERE b.status = 'approved' AND EXISTS ( \
                SELECT 1 FROM bookings p \
                WHERE p.vehicle_id = b.vehicle_id AND p.status = 'pending' AND p.id <> b.id \
                  AND p.start_at < b.end_at AND b.start_at < p.end_at)"
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        into_bookings(rows)
    }

    async fn transition(&self, id: Uuid, transition: &Transition) -> CoreResult<Option<Booking>> {
        // The exclusion constraint rejects an approval that would overlap
        // another approved row on the same vehicle.
        let sql = format!(
            "UPDATE bookings b SET status = $2, updated_at = NOW() \
             WHERE b.id = $1 AND b.status = $3 AND ($4::text IS NULL OR b.payment_status = $4) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .bind(transition.to.as_str())
            .bind(transition.from.as_str())
            .bind(transition.payment.map(|p| p.as_str()))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn reject_competing_pending(&self, approved: &Booking) -> CoreResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE bookings
            SET status = 'rejected', updated_at = NOW()
            WHERE vehicle_id = $1 AND status = 'pending' AND id <> $2
              AND start_at < $4 AND $3 < end_at
            RETURNING id
            "#,
        )
        .bind(approved.vehicle_id)
        .bind(approved.id)
        .bind(approved.start_at)
        .bind(approved.end_at)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(ids)
    }

    async fn bind_order_ref(&self, id: Uuid, order_ref: &str) -> CoreResult<Option<Booking>> {
        let sql = format!(
            "UPDATE bookings b SET order_ref = $2, payment_status = 'unpaid', updated_at = NOW() \
             WHERE b.id = $1 AND b.status = 'approved' AND b.payment_status <> 'paid' \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .bind(order_ref)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn settle_payment(
        &self,
        id: Uuid,
        settlement: &PaymentSettlement,
    ) -> CoreResult<Option<Booking>> {
        let sql = format!(
            "UPDATE bookings b SET payment_status = $2::text, \
                 payment_key = COALESCE($3, b.payment_key), \
                 approved_at = COALESCE($4, b.approved_at), \
                 updated_at = NOW() \
             WHERE b.id = $1 AND b.payment_status = 'unpaid' \
               AND ($2::text <> 'paid' OR b.status = 'approved') \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .bind(settlement.status.as_str())
            .bind(&settlement.payment_key)
            .bind(settlement.approved_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(Booking::try_from).transpose()
    }
}
