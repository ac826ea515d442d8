use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AppendOutcome, Booking, BusProfile, CancelOutcome, NewTripEvent, PinScope, Reservation,
    ReserveOutcome, ScheduleTemplate, Ticket, TicketContext, TripInstance, TripKey, TripStatus,
    TripStatusEvent, VerificationRecord, VerifyOutcome,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    /// A unique constraint rejected the write; carries the constraint name.
    #[error("duplicate: {0}")]
    Duplicate(String),
    /// Serialization failure, deadlock or pool exhaustion. Safe to retry.
    #[error("transient store failure: {0}")]
    Transient(String),
    #[error("store failure: {0}")]
    Unexpected(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read-only view of the fleet and its weekly templates, owned by the
/// owner console.
#[async_trait]
pub trait ScheduleDirectory: Send + Sync {
    async fn get_bus(&self, bus_id: Uuid) -> StoreResult<Option<BusProfile>>;
    async fn get_template(&self, template_id: Uuid) -> StoreResult<Option<ScheduleTemplate>>;
    async fn list_active_templates(
        &self,
        bus_id: Uuid,
        day_of_week: u8,
    ) -> StoreResult<Vec<ScheduleTemplate>>;
    /// Active buses serving the city pair, matched case-insensitively.
    async fn list_buses_on_route(&self, from_city: &str, to_city: &str)
    -> StoreResult<Vec<BusProfile>>;
}

#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn get_trip(&self, trip_id: Uuid) -> StoreResult<Option<TripInstance>>;
    async fn find_trip(&self, key: &TripKey) -> StoreResult<Option<TripInstance>>;
    /// Inserts the draft unless a trip with the same key exists, and returns
    /// whichever row holds the key afterwards.
    async fn insert_trip_if_absent(&self, draft: &TripInstance) -> StoreResult<TripInstance>;
    /// Compare-and-set on the status column. `None` when the trip was not in
    /// one of `from`.
    async fn set_status_if(
        &self,
        trip_id: Uuid,
        from: &[TripStatus],
        to: TripStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<TripInstance>>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Conditionally decrements the trip's inventory and persists the
    /// booking and ticket in one unit. Collisions on reference, ticket
    /// number or PIN surface as [`StoreError::Duplicate`] with nothing
    /// written.
    async fn reserve(&self, reservation: &Reservation) -> StoreResult<ReserveOutcome>;
    /// Cancels and restores inventory in one unit, unless the booking's trip
    /// has already departed.
    async fn cancel_booking(&self, booking_id: Uuid, at: DateTime<Utc>) -> StoreResult<CancelOutcome>;
    async fn get_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>>;
    async fn get_ticket_by_booking(&self, booking_id: Uuid) -> StoreResult<Option<Ticket>>;
    /// Newest first.
    async fn list_bookings_for_passenger(
        &self,
        passenger_ref: &str,
    ) -> StoreResult<Vec<(Booking, Ticket)>>;
    async fn list_trip_bookings(&self, trip_id: Uuid) -> StoreResult<Vec<(Booking, Ticket)>>;
}

#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Tickets of uncancelled bookings whose PIN matches and whose trip falls
    /// in the scope's window. Cancelled trips never match.
    async fn find_pin_candidates(&self, scope: &PinScope) -> StoreResult<Vec<TicketContext>>;
    /// Inserts unless a record for (ticket, service_date) exists. A first
    /// record moves a Scheduled trip to Boarding in the same unit.
    async fn record_verification(&self, record: &VerificationRecord) -> StoreResult<VerifyOutcome>;
    async fn list_trip_verifications(&self, trip_id: Uuid) -> StoreResult<Vec<VerificationRecord>>;
}

#[async_trait]
pub trait TripEventStore: Send + Sync {
    /// Appends the event and applies its status transition to the trip in
    /// the same unit. Completing the trip completes its confirmed bookings.
    /// `NotFound` when the trip does not exist.
    async fn append_event(&self, event: &NewTripEvent) -> StoreResult<AppendOutcome>;
    /// Ordered by `occurred_at`, then insertion order.
    async fn list_events(&self, trip_id: Uuid) -> StoreResult<Vec<TripStatusEvent>>;
}

/// Everything the engine needs from persistence.
pub trait EngineStore:
    ScheduleDirectory + TripRepository + BookingStore + VerificationStore + TripEventStore
{
}

impl<T> EngineStore for T where
    T: ScheduleDirectory + TripRepository + BookingStore + VerificationStore + TripEventStore
{
}
