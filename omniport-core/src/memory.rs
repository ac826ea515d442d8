//! In-memory implementation of the engine store.
//!
//! All tables live behind a single `tokio::sync::RwLock`, so every mutating
//! call is one critical section: the seat decrement and the booking/ticket
//! inserts happen together or not at all, exactly like the transaction in
//! the Postgres backend. Unique indexes are mirrored with hash sets.
//!
//! Not durable. Used for local development, tests, and when no database URL
//! is configured.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    AppendOutcome, Booking, BookingStatus, BusProfile, BusStatus, CancelOutcome, NewTripEvent,
    PinScope, Reservation, ReserveOutcome, ScheduleTemplate, Ticket, TicketContext, TripInstance,
    TripKey, TripStatus, TripStatusEvent, VerificationRecord, VerifyOutcome,
};
use crate::repository::{
    BookingStore, ScheduleDirectory, StoreError, StoreResult, TripEventStore, TripRepository,
    VerificationStore,
};

#[derive(Default)]
struct Tables {
    buses: HashMap<Uuid, BusProfile>,
    templates: HashMap<Uuid, ScheduleTemplate>,
    trips: HashMap<Uuid, TripInstance>,
    trip_keys: HashMap<TripKey, Uuid>,
    bookings: HashMap<Uuid, Booking>,
    tickets: HashMap<Uuid, Ticket>,
    ticket_by_booking: HashMap<Uuid, Uuid>,
    references: HashSet<String>,
    ticket_numbers: HashSet<String>,
    trip_pins: HashSet<(Uuid, String)>,
    verifications: Vec<VerificationRecord>,
    verified: HashMap<(Uuid, NaiveDate), usize>,
    events: Vec<TripStatusEvent>,
    next_seq: i64,
}

impl Tables {
    fn ticket_pair(&self, booking: &Booking) -> StoreResult<(Booking, Ticket)> {
        let ticket = self
            .ticket_by_booking
            .get(&booking.id)
            .and_then(|id| self.tickets.get(id))
            .ok_or_else(|| StoreError::Unexpected(format!("booking {} has no ticket", booking.id)))?;
        Ok((booking.clone(), ticket.clone()))
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    injected_failures: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_bus(&self, bus: BusProfile) {
        self.tables.write().await.buses.insert(bus.id, bus);
    }

    /// Mirrors the partial unique index: one active template per
    /// (bus, day, departure).
    pub async fn upsert_template(&self, template: ScheduleTemplate) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if template.active {
            let clash = tables.templates.values().any(|other| {
                other.id != template.id
                    && other.active
                    && other.bus_id == template.bus_id
                    && other.day_of_week == template.day_of_week
                    && other.departure_time == template.departure_time
            });
            if clash {
                return Err(StoreError::Duplicate("uq_schedule_templates_active".into()));
            }
        }
        tables.templates.insert(template.id, template);
        Ok(())
    }

    /// Makes the next `count` writes fail with a transient error, the way a
    /// serialization conflict would.
    pub fn fail_next_writes(&self, count: usize) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> StoreResult<()> {
        let taken = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        match taken {
            Ok(_) => Err(StoreError::Transient("could not serialize access".into())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl ScheduleDirectory for MemoryStore {
    async fn get_bus(&self, bus_id: Uuid) -> StoreResult<Option<BusProfile>> {
        Ok(self.tables.read().await.buses.get(&bus_id).cloned())
    }

    async fn get_template(&self, template_id: Uuid) -> StoreResult<Option<ScheduleTemplate>> {
        Ok(self.tables.read().await.templates.get(&template_id).cloned())
    }

    async fn list_active_templates(
        &self,
        bus_id: Uuid,
        day_of_week: u8,
    ) -> StoreResult<Vec<ScheduleTemplate>> {
        let tables = self.tables.read().await;
        let mut templates: Vec<_> = tables
            .templates
            .values()
            .filter(|t| t.active && t.bus_id == bus_id && t.day_of_week == day_of_week)
            .cloned()
            .collect();
        templates.sort_by_key(|t| t.departure_time);
        Ok(templates)
    }

    async fn list_buses_on_route(
        &self,
        from_city: &str,
        to_city: &str,
    ) -> StoreResult<Vec<BusProfile>> {
        let tables = self.tables.read().await;
        let mut buses: Vec<_> = tables
            .buses
            .values()
            .filter(|b| {
                b.status == BusStatus::Active
                    && b.from_city.eq_ignore_ascii_case(from_city)
                    && b.to_city.eq_ignore_ascii_case(to_city)
            })
            .cloned()
            .collect();
        buses.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buses)
    }
}

#[async_trait]
impl TripRepository for MemoryStore {
    async fn get_trip(&self, trip_id: Uuid) -> StoreResult<Option<TripInstance>> {
        Ok(self.tables.read().await.trips.get(&trip_id).cloned())
    }

    async fn find_trip(&self, key: &TripKey) -> StoreResult<Option<TripInstance>> {
        let tables = self.tables.read().await;
        Ok(tables
            .trip_keys
            .get(key)
            .and_then(|id| tables.trips.get(id))
            .cloned())
    }

    async fn insert_trip_if_absent(&self, draft: &TripInstance) -> StoreResult<TripInstance> {
        self.take_injected_failure()?;
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let key = draft.key();
        if let Some(existing) = tables.trip_keys.get(&key).and_then(|id| tables.trips.get(id)) {
            return Ok(existing.clone());
        }
        tables.trip_keys.insert(key, draft.id);
        tables.trips.insert(draft.id, draft.clone());
        Ok(draft.clone())
    }

    async fn set_status_if(
        &self,
        trip_id: Uuid,
        from: &[TripStatus],
        to: TripStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<TripInstance>> {
        let mut tables = self.tables.write().await;
        match tables.trips.get_mut(&trip_id) {
            Some(trip) if from.contains(&trip.status) => {
                trip.status = to;
                trip.updated_at = at;
                Ok(Some(trip.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn reserve(&self, reservation: &Reservation) -> StoreResult<ReserveOutcome> {
        self.take_injected_failure()?;
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let booking = &reservation.booking;
        let ticket = &reservation.ticket;

        let Some(trip) = tables.trips.get(&booking.trip_id) else {
            return Ok(ReserveOutcome::TripMissing);
        };
        if !trip.status.is_bookable() {
            return Ok(ReserveOutcome::NotBookable(trip.status));
        }
        if trip.seats_available < booking.seat_count {
            return Ok(ReserveOutcome::SeatsUnavailable {
                available: trip.seats_available,
            });
        }

        if tables.references.contains(&booking.reference) {
            return Err(StoreError::Duplicate("uq_bookings_reference".into()));
        }
        if tables.ticket_numbers.contains(&ticket.ticket_number) {
            return Err(StoreError::Duplicate("uq_tickets_ticket_number".into()));
        }
        let pin_key = (ticket.trip_id, ticket.tracking_pin.clone());
        if tables.trip_pins.contains(&pin_key) {
            return Err(StoreError::Duplicate("uq_tickets_trip_pin".into()));
        }

        let seats_available = match tables.trips.get_mut(&booking.trip_id) {
            Some(trip) => {
                trip.seats_available -= booking.seat_count;
                trip.updated_at = booking.created_at;
                trip.seats_available
            }
            None => return Ok(ReserveOutcome::TripMissing),
        };
        tables.references.insert(booking.reference.clone());
        tables.ticket_numbers.insert(ticket.ticket_number.clone());
        tables.trip_pins.insert(pin_key);
        tables.bookings.insert(booking.id, booking.clone());
        tables.ticket_by_booking.insert(booking.id, ticket.id);
        tables.tickets.insert(ticket.id, ticket.clone());

        Ok(ReserveOutcome::Reserved {
            booking: booking.clone(),
            ticket: ticket.clone(),
            seats_available,
        })
    }

    async fn cancel_booking(&self, booking_id: Uuid, at: DateTime<Utc>) -> StoreResult<CancelOutcome> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;

        let Some(booking) = tables.bookings.get_mut(&booking_id) else {
            return Ok(CancelOutcome::Missing);
        };
        match booking.status {
            BookingStatus::Cancelled => return Ok(CancelOutcome::AlreadyCancelled(booking.clone())),
            BookingStatus::Completed => return Ok(CancelOutcome::NotCancellable(booking.clone())),
            BookingStatus::Confirmed => {}
        }

        let trip = tables.trips.get_mut(&booking.trip_id).ok_or_else(|| {
            StoreError::Unexpected(format!("booking {} references a missing trip", booking.id))
        })?;
        if !trip.allows_booking_cancellation() {
            return Ok(CancelOutcome::NotCancellable(booking.clone()));
        }
        trip.seats_available = (trip.seats_available + booking.seat_count).min(trip.total_seats);
        trip.updated_at = at;

        booking.status = BookingStatus::Cancelled;
        booking.updated_at = at;

        Ok(CancelOutcome::Cancelled {
            booking: booking.clone(),
            seats_available: trip.seats_available,
        })
    }

    async fn get_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.tables.read().await.bookings.get(&booking_id).cloned())
    }

    async fn get_ticket_by_booking(&self, booking_id: Uuid) -> StoreResult<Option<Ticket>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ticket_by_booking
            .get(&booking_id)
            .and_then(|id| tables.tickets.get(id))
            .cloned())
    }

    async fn list_bookings_for_passenger(
        &self,
        passenger_ref: &str,
    ) -> StoreResult<Vec<(Booking, Ticket)>> {
        let tables = self.tables.read().await;
        let mut rows = tables
            .bookings
            .values()
            .filter(|b| b.passenger_ref == passenger_ref)
            .map(|b| tables.ticket_pair(b))
            .collect::<StoreResult<Vec<_>>>()?;
        rows.sort_by(|a, b| b.0.created_at.cmp(&a.0.created_at));
        Ok(rows)
    }

    async fn list_trip_bookings(&self, trip_id: Uuid) -> StoreResult<Vec<(Booking, Ticket)>> {
        let tables = self.tables.read().await;
        let mut rows = tables
            .bookings
            .values()
            .filter(|b| b.trip_id == trip_id)
            .map(|b| tables.ticket_pair(b))
            .collect::<StoreResult<Vec<_>>>()?;
        rows.sort_by(|a, b| a.0.created_at.cmp(&b.0.created_at));
        Ok(rows)
    }
}

#[async_trait]
impl VerificationStore for MemoryStore {
    async fn find_pin_candidates(&self, scope: &PinScope) -> StoreResult<Vec<TicketContext>> {
        let tables = self.tables.read().await;
        let mut candidates = Vec::new();
        for ticket in tables.tickets.values().filter(|t| t.tracking_pin == scope.pin) {
            if scope.trip_id.is_some_and(|id| id != ticket.trip_id) {
                continue;
            }
            let Some(booking) = tables.bookings.get(&ticket.booking_id) else {
                continue;
            };
            if booking.status == BookingStatus::Cancelled {
                continue;
            }
            let Some(trip) = tables.trips.get(&ticket.trip_id) else {
                continue;
            };
            if trip.status == TripStatus::Cancelled || !scope.window.contains(trip.service_date) {
                continue;
            }
            if scope.served_by.as_deref().is_some_and(|who| !trip.is_served_by(who)) {
                continue;
            }
            candidates.push(TicketContext {
                ticket: ticket.clone(),
                booking: booking.clone(),
                trip: trip.clone(),
            });
        }
        candidates.sort_by_key(|c| (c.trip.service_date, c.trip.departure_time));
        Ok(candidates)
    }

    async fn record_verification(&self, record: &VerificationRecord) -> StoreResult<VerifyOutcome> {
        self.take_injected_failure()?;
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let key = (record.ticket_id, record.service_date);
        if let Some(prior) = tables.verified.get(&key).and_then(|i| tables.verifications.get(*i)) {
            return Ok(VerifyOutcome::AlreadyVerified(prior.clone()));
        }
        // First check-in opens boarding.
        if let Some(trip) = tables.trips.get_mut(&record.trip_id) {
            if trip.status == TripStatus::Scheduled {
                trip.status = TripStatus::Boarding;
                trip.updated_at = record.verified_at;
            }
        }
        let index = tables.verifications.len();
        tables.verifications.push(record.clone());
        tables.verified.insert(key, index);
        Ok(VerifyOutcome::Recorded(record.clone()))
    }

    async fn list_trip_verifications(&self, trip_id: Uuid) -> StoreResult<Vec<VerificationRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .verifications
            .iter()
            .filter(|v| v.trip_id == trip_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TripEventStore for MemoryStore {
    async fn append_event(&self, event: &NewTripEvent) -> StoreResult<AppendOutcome> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;

        let trip = tables
            .trips
            .get_mut(&event.trip_id)
            .ok_or_else(|| StoreError::NotFound(format!("trip {}", event.trip_id)))?;
        let transition = trip.status.apply(event.event_type);
        if transition.changed() {
            trip.status = transition.next;
            trip.updated_at = event.recorded_at;
        }
        if transition.inconsistent {
            trip.inconsistent = true;
        }
        let trip = trip.clone();

        if transition.changed() && transition.next == TripStatus::Completed {
            for booking in tables.bookings.values_mut() {
                if booking.trip_id == trip.id && booking.status == BookingStatus::Confirmed {
                    booking.status = BookingStatus::Completed;
                    booking.updated_at = event.recorded_at;
                }
            }
        }

        tables.next_seq += 1;
        let stored = TripStatusEvent {
            id: event.id,
            seq: tables.next_seq,
            trip_id: event.trip_id,
            emitted_by: event.emitted_by.clone(),
            event_type: event.event_type,
            occurred_at: event.occurred_at,
            recorded_at: event.recorded_at,
            message: event.message.clone(),
            geo: event.geo,
        };
        tables.events.push(stored.clone());

        Ok(AppendOutcome {
            event: stored,
            trip,
            transition,
        })
    }

    async fn list_events(&self, trip_id: Uuid) -> StoreResult<Vec<TripStatusEvent>> {
        let tables = self.tables.read().await;
        let mut events: Vec<_> = tables
            .events
            .iter()
            .filter(|e| e.trip_id == trip_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.occurred_at, e.seq));
        Ok(events)
    }
}
