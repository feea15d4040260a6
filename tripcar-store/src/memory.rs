use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

use tripcar_core::booking::{PaymentSettlement, Transition};
use tripcar_core::identity::{Contact, IdentityDirectory};
use tripcar_core::payment::PaymentAnomaly;
use tripcar_core::repository::{AnomalyRepository, BookingRepository, DedupStore, VehicleRepository};
use tripcar_core::{Booking, BookingStatus, CoreError, CoreResult, DateRange, PaymentStatus, Vehicle};

#[derive(Default)]
struct Inner {
    vehicles: HashMap<Uuid, Vehicle>,
    contacts: HashMap<String, Contact>,
    bookings: HashMap<Uuid, Booking>,
    anomalies: Vec<PaymentAnomaly>,
    fail_cascades: bool,
}

impl Inner {
    fn approved_conflict(&self, candidate: &Booking) -> bool {
        self.bookings.values().any(|other| {
            other.id != candidate.id
                && other.status == BookingStatus::Approved
                && other.overlaps(candidate)
        })
    }

    fn owner_of(&self, vehicle_id: Uuid) -> Option<&str> {
        self.vehicles.get(&vehicle_id).map(|v| v.owner_id.as_str())
    }
}

/// Single-process store behind one mutex. Every guarded write checks and
/// mutates under the same lock, giving the same atomicity the Postgres
/// constraints and conditional updates provide.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| CoreError::Internal("memory store poisoned".to_string()))
    }

    pub fn add_vehicle(&self, vehicle: Vehicle) -> CoreResult<()> {
        self.lock()?.vehicles.insert(vehicle.id, vehicle);
        Ok(())
    }

    pub fn add_contact(&self, user_id: &str, contact: Contact) -> CoreResult<()> {
        self.lock()?.contacts.insert(user_id.to_string(), contact);
        Ok(())
    }

    /// Makes `reject_competing_pending` fail, to exercise partial cascades.
    pub fn set_cascade_failure(&self, fail: bool) -> CoreResult<()> {
        self.lock()?.fail_cascades = fail;
        Ok(())
    }

    pub fn booking_count(&self) -> CoreResult<usize> {
        Ok(self.lock()?.bookings.len())
    }
}

#[async_trait]
impl VehicleRepository for MemoryStore {
    async fn get_vehicle(&self, id: Uuid) -> CoreResult<Option<Vehicle>> {
        Ok(self.lock()?.vehicles.get(&id).cloned())
    }

    async fn count_vehicles_by_owner(&self, owner_id: &str) -> CoreResult<u64> {
        Ok(self.lock()?.vehicles.values().filter(|v| v.owner_id == owner_id).count() as u64)
    }
}

#[async_trait]
impl IdentityDirectory for MemoryStore {
    async fn get_contact(&self, user_id: &str) -> CoreResult<Option<Contact>> {
        Ok(self.lock()?.contacts.get(user_id).cloned())
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn insert_booking(&self, booking: &Booking) -> CoreResult<()> {
        let mut inner = self.lock()?;
        if booking.status == BookingStatus::Approved && inner.approved_conflict(booking) {
            return Err(CoreError::Conflict("overlapping approved booking".to_string()));
        }
        if inner.bookings.contains_key(&booking.id) {
            return Err(CoreError::Conflict(format!("booking {} already exists", booking.id)));
        }
        inner.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        Ok(self.lock()?.bookings.get(&id).cloned())
    }

    async fn find_by_order_ref(&self, order_ref: &str) -> CoreResult<Option<Booking>> {
        Ok(self
            .lock()?
            .bookings
            .values()
            .find(|b| b.order_ref.as_deref() == Some(order_ref))
            .cloned())
    }

    async fn list_overlapping(
        &self,
        vehicle_id: Uuid,
        range: &DateRange,
        status: BookingStatus,
    ) -> CoreResult<Vec<Booking>> {
        Ok(self
            .lock()?
            .bookings
            .values()
            .filter(|b| b.vehicle_id == vehicle_id && b.status == status && b.range().overlaps(range))
            .cloned()
            .collect())
    }

    async fn list_by_renter(&self, renter_id: &str) -> CoreResult<Vec<Booking>> {
        let inner = self.lock()?;
        let mut bookings: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| b.renter_id == renter_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn list_by_owner(&self, owner_id: &str) -> CoreResult<Vec<Booking>> {
        let inner = self.lock()?;
        let mut bookings: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| inner.owner_of(b.vehicle_id) == Some(owner_id))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn list_approved_with_pending_competitors(&self) -> CoreResult<Vec<Booking>> {
        let inner = self.lock()?;
        Ok(inner
            .bookings
            .values()
            .filter(|approved| {
                approved.status == BookingStatus::Approved
                    && inner.bookings.values().any(|other| {
                        other.id != approved.id
                            && other.status == BookingStatus::Pending
                            && other.overlaps(approved)
                    })
            })
            .cloned()
            .collect())
    }

    async fn transition(&self, id: Uuid, transition: &Transition) -> CoreResult<Option<Booking>> {
        let mut inner = self.lock()?;
        let Some(current) = inner.bookings.get(&id).cloned() else {
            return Ok(None);
        };
        if !transition.matches(&current) {
            return Ok(None);
        }
        if transition.to == BookingStatus::Approved && inner.approved_conflict(&current) {
            return Err(CoreError::Conflict("overlapping approved booking".to_string()));
        }

        let Some(booking) = inner.bookings.get_mut(&id) else {
            return Ok(None);
        };
        booking.status = transition.to;
        booking.updated_at = Utc::now();
        Ok(Some(booking.clone()))
    }

    async fn reject_competing_pending(&self, approved: &Booking) -> CoreResult<Vec<Uuid>> {
        let mut inner = self.lock()?;
        if inner.fail_cascades {
            return Err(CoreError::Internal("cascade write failed".to_string()));
        }
        let now = Utc::now();
        let mut rejected = Vec::new();
        for booking in inner.bookings.values_mut() {
            if booking.id != approved.id
                && booking.status == BookingStatus::Pending
                && booking.overlaps(approved)
            {
                booking.status = BookingStatus::Rejected;
                booking.updated_at = now;
                rejected.push(booking.id);
            }
        }
        Ok(rejected)
    }

    async fn bind_order_ref(&self, id: Uuid, order_ref: &str) -> CoreResult<Option<Booking>> {
        let mut inner = self.lock()?;
        let Some(booking) = inner.bookings.get_mut(&id) else {
            return Ok(None);
        };
        if booking.status != BookingStatus::Approved || booking.payment_status == PaymentStatus::Paid {
            return Ok(None);
        }
        booking.order_ref = Some(order_ref.to_string());
        booking.payment_status = PaymentStatus::Unpaid;
        booking.updated_at = Utc::now();
        Ok(Some(booking.clone()))
    }

    async fn settle_payment(
        &self,
        id: Uuid,
        settlement: &PaymentSettlement,
    ) -> CoreResult<Option<Booking>> {
        let mut inner = self.lock()?;
        let Some(booking) = inner.bookings.get_mut(&id) else {
            return Ok(None);
        };
        if booking.payment_status != PaymentStatus::Unpaid {
            return Ok(None);
        }
        if settlement.status == PaymentStatus::Paid && booking.status != BookingStatus::Approved {
            return Ok(None);
        }
        booking.payment_status = settlement.status;
        if settlement.payment_key.is_some() {
            booking.payment_key = settlement.payment_key.clone();
        }
        if settlement.approved_at.is_some() {
            booking.approved_at = settlement.approved_at;
        }
        booking.updated_at = Utc::now();
        Ok(Some(booking.clone()))
    }
}

#[async_trait]
impl AnomalyRepository for MemoryStore {
    async fn record_anomaly(&self, anomaly: &PaymentAnomaly) -> CoreResult<()> {
        self.lock()?.anomalies.push(anomaly.clone());
        Ok(())
    }

    async fn list_anomalies(&self, limit: i64) -> CoreResult<Vec<PaymentAnomaly>> {
        let inner = self.lock()?;
        Ok(inner
            .anomalies
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

/// In-process dedup map. Entries older than their ttl are swept on every
/// access. Only correct for a single instance; deployments use Redis.
#[derive(Default)]
pub struct MemoryDedupStore {
    entries: Mutex<HashMap<String, (String, Instant, Duration)>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CoreResult<MutexGuard<'_, HashMap<String, (String, Instant, Duration)>>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CoreError::Internal("dedup store poisoned".to_string()))?;
        entries.retain(|_, (_, stored_at, ttl)| stored_at.elapsed() < *ttl);
        Ok(entries)
    }

    pub fn len(&self) -> CoreResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn recall(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.lock()?.get(key).map(|(value, _, _)| value.clone()))
    }

    async fn remember(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<String> {
        let mut entries = self.lock()?;
        let (stored, _, _) = entries
            .entry(key.to_string())
            .or_insert_with(|| (value.to_string(), Instant::now(), ttl));
        Ok(stored.clone())
    }
}
