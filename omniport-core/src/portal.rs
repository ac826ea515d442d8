use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::boarding::{passenger_summary, BoardingConfirmation, BoardingVerifier, VerifyRequest};
use crate::clock::Clock;
use crate::codes::{normalize_pin, CodeGenerator, DEFAULT_PIN_LENGTH};
use crate::error::{EngineError, EngineResult};
use crate::ledger::{Cancellation, ReservationReceipt, SeatLedger};
use crate::materializer::TripMaterializer;
use crate::models::{
    AppendOutcome, Booking, BookingStatus, DateWindow, PassengerDetails, PassengerSummary, PinScope,
    Ticket, TripInstance, TripStatus, TripStatusEvent,
};
use crate::repository::{BookingStore, EngineStore, TripRepository, VerificationStore};
use crate::retry::RetryPolicy;
use crate::search::{TripSearch, TripSearchRequest, TripSearchResult};
use crate::status_log::{ReportEvent, TripStatusLog, TripStatusView};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub pin_length: usize,
    pub max_seats_per_booking: i32,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pin_length: DEFAULT_PIN_LENGTH,
            max_seats_per_booking: 1,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookSeatRequest {
    pub template_id: Uuid,
    pub service_date: NaiveDate,
    pub passenger_ref: String,
    pub passenger: PassengerDetails,
    pub seat_count: i32,
}

#[derive(Debug, Clone)]
pub struct BookingConfirmation {
    pub trip: TripInstance,
    pub receipt: ReservationReceipt,
}

/// What the public tracking page shows for a PIN.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedTicket {
    pub ticket_number: String,
    pub booking_reference: String,
    pub booking_status: BookingStatus,
    pub passenger_name: String,
    pub trip: TripInstance,
    pub events: Vec<TripStatusEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripManifest {
    pub trip: TripInstance,
    pub passengers: Vec<PassengerSummary>,
    pub verified_count: usize,
}

/// Entry point for every operation the portal and the consoles call.
pub struct Portal {
    store: Arc<dyn EngineStore>,
    clock: Arc<dyn Clock>,
    materializer: TripMaterializer,
    ledger: SeatLedger,
    boarding: BoardingVerifier,
    status_log: TripStatusLog,
    search: TripSearch,
}

impl Portal {
    pub fn new(store: Arc<dyn EngineStore>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            materializer: TripMaterializer::new(store.clone(), clock.clone(), config.retry.clone()),
            ledger: SeatLedger::new(
                store.clone(),
                clock.clone(),
                CodeGenerator::new(config.pin_length),
                config.retry,
                config.max_seats_per_booking,
            ),
            boarding: BoardingVerifier::new(store.clone(), clock.clone()),
            status_log: TripStatusLog::new(store.clone(), clock.clone()),
            search: TripSearch::new(store.clone()),
            store,
            clock,
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn materializer(&self) -> &TripMaterializer {
        &self.materializer
    }

    pub fn ledger(&self) -> &SeatLedger {
        &self.ledger
    }

    pub async fn search_trips(&self, request: &TripSearchRequest) -> EngineResult<Vec<TripSearchResult>> {
        self.search.search(request).await
    }

    /// Materialize the trip for (template, date) and reserve on it.
    pub async fn book_seat(&self, request: BookSeatRequest) -> EngineResult<BookingConfirmation> {
        if request.service_date < self.clock.today() {
            return Err(EngineError::InvalidRequest(format!(
                "service date {} is in the past",
                request.service_date
            )));
        }
        let trip = self
            .materializer
            .get_or_create_trip(request.template_id, request.service_date)
            .await?;
        let receipt = self
            .ledger
            .reserve_seat(trip.id, &request.passenger_ref, request.passenger, request.seat_count)
            .await?;
        let trip = TripInstance {
            seats_available: receipt.seats_available,
            ..trip
        };
        Ok(BookingConfirmation { trip, receipt })
    }

    /// `owner` restricts the call to the passenger's own bookings. Bookings
    /// owned by someone else look missing.
    pub async fn get_booking(&self, booking_id: Uuid, owner: Option<&str>) -> EngineResult<(Booking, Ticket)> {
        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .filter(|b| owner.map_or(true, |o| b.passenger_ref == o))
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let ticket = self
            .store
            .get_ticket_by_booking(booking_id)
            .await?
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        Ok((booking, ticket))
    }

    pub async fn cancel_booking(&self, booking_id: Uuid, owner: Option<&str>) -> EngineResult<Cancellation> {
        if owner.is_some() {
            self.get_booking(booking_id, owner).await?;
        }
        self.ledger.cancel_booking(booking_id).await
    }

    pub async fn list_bookings(&self, passenger_ref: &str) -> EngineResult<Vec<(Booking, Ticket)>> {
        Ok(self.store.list_bookings_for_passenger(passenger_ref).await?)
    }

    pub async fn verify_boarding(&self, request: VerifyRequest) -> EngineResult<BoardingConfirmation> {
        self.boarding.verify(request).await
    }

    pub async fn report_trip_event(&self, report: ReportEvent) -> EngineResult<AppendOutcome> {
        self.status_log.append_event(report).await
    }

    pub async fn list_trip_events(&self, trip_id: Uuid) -> EngineResult<Vec<TripStatusEvent>> {
        self.status_log.list_events(trip_id).await
    }

    pub async fn get_trip_status(&self, trip_id: Uuid) -> EngineResult<TripStatusView> {
        self.status_log.trip_status(trip_id).await
    }

    /// PIN lookup for the public tracking page: confirmed bookings on trips
    /// running today or later.
    pub async fn track_ticket(&self, pin: &str) -> EngineResult<TrackedTicket> {
        let pin = normalize_pin(pin);
        if pin.is_empty() {
            return Err(EngineError::InvalidRequest("tracking PIN is required".into()));
        }
        let scope = PinScope {
            pin,
            window: DateWindow::From(self.clock.today()),
            trip_id: None,
            served_by: None,
        };
        let ctx = self.boarding.resolve(&scope).await?;
        let events = self.status_log.list_events(ctx.trip.id).await?;
        Ok(TrackedTicket {
            ticket_number: ctx.ticket.ticket_number,
            booking_reference: ctx.booking.reference,
            booking_status: ctx.booking.status,
            passenger_name: ctx.booking.passenger.name,
            trip: ctx.trip,
            events,
        })
    }

    /// Confirmed passengers of a trip with their check-in state for its
    /// service day.
    pub async fn trip_manifest(&self, trip_id: Uuid) -> EngineResult<TripManifest> {
        let trip = self
            .store
            .get_trip(trip_id)
            .await?
            .ok_or(EngineError::TripNotFound(trip_id))?;
        let verifications = self.store.list_trip_verifications(trip_id).await?;

        let passengers: Vec<PassengerSummary> = self
            .store
            .list_trip_bookings(trip_id)
            .await?
            .iter()
            .filter(|(booking, _)| booking.status != BookingStatus::Cancelled)
            .map(|(booking, ticket)| {
                let verification = verifications
                    .iter()
                    .find(|v| v.ticket_id == ticket.id && v.service_date == trip.service_date);
                passenger_summary(booking, ticket, verification, self.clock.as_ref())
            })
            .collect();
        let verified_count = passengers.iter().filter(|p| p.verified_at.is_some()).count();

        Ok(TripManifest {
            trip,
            passengers,
            verified_count,
        })
    }

    /// Operator cancellation. Refused once the trip has completed; repeat
    /// calls return the cancelled trip.
    pub async fn cancel_trip(&self, trip_id: Uuid) -> EngineResult<TripInstance> {
        let trip = self
            .store
            .get_trip(trip_id)
            .await?
            .ok_or(EngineError::TripNotFound(trip_id))?;
        if trip.status == TripStatus::Cancelled {
            return Ok(trip);
        }

        let open = [TripStatus::Scheduled, TripStatus::Boarding, TripStatus::InProgress];
        match self
            .store
            .set_status_if(trip_id, &open, TripStatus::Cancelled, self.clock.now())
            .await?
        {
            Some(cancelled) => {
                info!(trip_id = %trip_id, previous = %trip.status, "Trip cancelled by operator");
                Ok(cancelled)
            }
            None => {
                let current = self
                    .store
                    .get_trip(trip_id)
                    .await?
                    .ok_or(EngineError::TripNotFound(trip_id))?;
                match current.status {
                    TripStatus::Cancelled => Ok(current),
                    status => Err(EngineError::TripNotCancellable { trip_id, status }),
                }
            }
        }
    }
}
