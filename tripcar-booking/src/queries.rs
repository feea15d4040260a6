use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use tripcar_core::identity::{Contact, IdentityDirectory};
use tripcar_core::repository::{BookingRepository, VehicleRepository};
use tripcar_core::{Booking, BookingStatus, CoreError, CoreResult, PaymentStatus, Vehicle};

use crate::pricing;

#[derive(Debug, Clone, Serialize)]
pub struct VehicleSummary {
    pub id: Uuid,
    pub model: String,
    pub plate_number: String,
    pub airport_location: String,
}

impl From<&Vehicle> for VehicleSummary {
    fn from(v: &Vehicle) -> Self {
        Self {
            id: v.id,
            model: v.model.clone(),
            plate_number: v.plate_number.clone(),
            airport_location: v.airport_location.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub vehicle: Option<VehicleSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceivedBooking {
    #[serde(flatten)]
    pub view: BookingView,
    pub renter: Contact,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViewerRole {
    Renter,
    Owner,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingDetail {
    #[serde(flatten)]
    pub view: BookingView,
    pub viewer_role: ViewerRole,
    /// The other party: the owner for a renter, the renter for an owner.
    pub counterpart: Contact,
    pub rental_days: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    pub order_ref: Option<String>,
    pub payment_key: Option<String>,
    pub payment_status: PaymentStatus,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProfileStats {
    pub paid_orders: usize,
    pub paid_total: i64,
    pub active_bookings: usize,
    pub registered_vehicles: u64,
}

/// Read side for renter and owner screens.
pub struct BookingQueries {
    bookings: Arc<dyn BookingRepository>,
    vehicles: Arc<dyn VehicleRepository>,
    identities: Arc<dyn IdentityDirectory>,
}

impl BookingQueries {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        vehicles: Arc<dyn VehicleRepository>,
        identities: Arc<dyn IdentityDirectory>,
    ) -> Self {
        Self { bookings, vehicles, identities }
    }

    pub async fn my_bookings(&self, renter_id: &str) -> CoreResult<Vec<BookingView>> {
        let bookings = self.bookings.list_by_renter(renter_id).await?;
        self.with_vehicles(bookings).await
    }

    /// Paid bookings of the renter, the "orders" history.
    pub async fn my_orders(&self, renter_id: &str) -> CoreResult<Vec<BookingView>> {
        let paid = self
            .bookings
            .list_by_renter(renter_id)
            .await?
            .into_iter()
            .filter(|b| b.payment_status == PaymentStatus::Paid)
            .collect();
        self.with_vehicles(paid).await
    }

    pub async fn received_bookings(&self, owner_id: &str) -> CoreResult<Vec<ReceivedBooking>> {
        let bookings = self.bookings.list_by_owner(owner_id).await?;
        let mut received = Vec::with_capacity(bookings.len());
        for view in self.with_vehicles(bookings).await? {
            let renter = self.contact(&view.booking.renter_id).await?;
            received.push(ReceivedBooking { view, renter });
        }
        Ok(received)
    }

    pub async fn booking_detail(&self, booking_id: Uuid, actor_id: &str) -> CoreResult<BookingDetail> {
        let (booking, vehicle, role) = self.load_visible(booking_id, actor_id).await?;
        let counterpart = match role {
            ViewerRole::Renter => match &vehicle {
                Some(v) => self.contact(&v.owner_id).await?,
                None => Contact::unknown(),
            },
            ViewerRole::Owner => self.contact(&booking.renter_id).await?,
        };
        let rental_days = pricing::billable_days(&booking.range());

        Ok(BookingDetail {
            view: BookingView { booking, vehicle: vehicle.as_ref().map(VehicleSummary::from) },
            viewer_role: role,
            counterpart,
            rental_days,
        })
    }

    pub async fn payment_info(&self, booking_id: Uuid, actor_id: &str) -> CoreResult<PaymentInfo> {
        let (booking, _, _) = self.load_visible(booking_id, actor_id).await?;
        Ok(PaymentInfo {
            order_ref: booking.order_ref,
            payment_key: booking.payment_key,
            payment_status: booking.payment_status,
            amount: booking.total_price,
        })
    }

    pub async fn profile_stats(&self, user_id: &str) -> CoreResult<ProfileStats> {
        let bookings = self.bookings.list_by_renter(user_id).await?;
        let paid: Vec<&Booking> = bookings
            .iter()
            .filter(|b| b.payment_status == PaymentStatus::Paid)
            .collect();
        let active_bookings = bookings
            .iter()
            .filter(|b| matches!(b.status, BookingStatus::Pending | BookingStatus::Approved))
            .count();

        Ok(ProfileStats {
            paid_orders: paid.len(),
            paid_total: paid.iter().map(|b| b.total_price).sum(),
            active_bookings,
            registered_vehicles: self.vehicles.count_vehicles_by_owner(user_id).await?,
        })
    }

    /// Only the renter and the vehicle owner may see a booking.
    async fn load_visible(
        &self,
        booking_id: Uuid,
        actor_id: &str,
    ) -> CoreResult<(Booking, Option<Vehicle>, ViewerRole)> {
        let booking = self
            .bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("booking {}", booking_id)))?;
        let vehicle = self.vehicles.get_vehicle(booking.vehicle_id).await?;

        let role = if booking.renter_id == actor_id {
            ViewerRole::Renter
        } else if vehicle.as_ref().is_some_and(|v| v.owner_id == actor_id) {
            ViewerRole::Owner
        } else {
            return Err(CoreError::Forbidden("not a party to this booking".to_string()));
        };
        Ok((booking, vehicle, role))
    }

    async fn with_vehicles(&self, bookings: Vec<Booking>) -> CoreResult<Vec<BookingView>> {
        let mut views = Vec::with_capacity(bookings.len());
        for booking in bookings {
            let vehicle = self.vehicles.get_vehicle(booking.vehicle_id).await?;
            views.push(BookingView { vehicle: vehicle.as_ref().map(VehicleSummary::from), booking });
        }
        Ok(views)
    }

    async fn contact(&self, user_id: &str) -> CoreResult<Contact> {
        Ok(self.identities.get_contact(user_id).await?.unwrap_or_else(Contact::unknown))
    }
}
