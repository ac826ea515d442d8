use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::codes::normalize_pin;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    Booking, DateWindow, GeoPoint, PassengerSummary, PinScope, Ticket, TicketContext,
    VerificationMethod, VerificationRecord, VerifyOutcome,
};
use crate::repository::{EngineStore, TripRepository, VerificationStore};

#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub pin: String,
    pub verifier_id: String,
    /// Narrows PIN resolution to one trip, typically the driver's current one.
    pub trip_id: Option<Uuid>,
    pub method: VerificationMethod,
    pub geo: Option<GeoPoint>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BoardingConfirmation {
    pub record: VerificationRecord,
    pub passenger: PassengerSummary,
}

/// Checks tracking PINs in, at most once per ticket per service day.
pub struct BoardingVerifier {
    store: Arc<dyn EngineStore>,
    clock: Arc<dyn Clock>,
}

impl BoardingVerifier {
    pub fn new(store: Arc<dyn EngineStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn verify(&self, request: VerifyRequest) -> EngineResult<BoardingConfirmation> {
        let pin = normalize_pin(&request.pin);
        if pin.is_empty() {
            return Err(EngineError::InvalidRequest("tracking PIN is required".into()));
        }
        if request.verifier_id.trim().is_empty() {
            return Err(EngineError::InvalidRequest("verifier identity is required".into()));
        }
        if let Some(geo) = &request.geo {
            geo.validate().map_err(EngineError::InvalidRequest)?;
        }

        if let Some(trip_id) = request.trip_id {
            let trip = self
                .store
                .get_trip(trip_id)
                .await?
                .ok_or(EngineError::TripNotFound(trip_id))?;
            if !trip.is_served_by(&request.verifier_id) {
                warn!(%trip_id, verifier = %request.verifier_id, "Verification refused for unassigned driver");
                return Err(EngineError::NotAssignedDriver { trip_id });
            }
        }

        let now = self.clock.now();
        let today = self.clock.local_date(now);
        let scope = PinScope {
            pin,
            window: DateWindow::On(today),
            trip_id: request.trip_id,
            served_by: Some(request.verifier_id.clone()),
        };
        let ctx = self.resolve(&scope).await?;

        let record = VerificationRecord {
            id: Uuid::new_v4(),
            ticket_id: ctx.ticket.id,
            trip_id: ctx.trip.id,
            service_date: ctx.trip.service_date,
            verified_by: request.verifier_id,
            verified_at: now,
            method: request.method,
            geo: request.geo,
            notes: request.notes.filter(|n| !n.trim().is_empty()),
        };

        match self.store.record_verification(&record).await? {
            VerifyOutcome::Recorded(record) => {
                info!(
                    ticket = %ctx.ticket.ticket_number,
                    trip_id = %ctx.trip.id,
                    verified_by = %record.verified_by,
                    method = %record.method,
                    "Passenger verified"
                );
                let passenger = passenger_summary(&ctx.booking, &ctx.ticket, Some(&record), self.clock.as_ref());
                Ok(BoardingConfirmation { record, passenger })
            }
            VerifyOutcome::AlreadyVerified(prior) => Err(EngineError::AlreadyVerified {
                ticket_number: ctx.ticket.ticket_number,
                verified_at: prior.verified_at,
                local_time: self.clock.local_time_label(prior.verified_at),
            }),
        }
    }

    /// Exactly one candidate or nothing. Never picks among several.
    pub async fn resolve(&self, scope: &PinScope) -> EngineResult<TicketContext> {
        let mut candidates = self.store.find_pin_candidates(scope).await?;
        match candidates.len() {
            0 => Err(EngineError::PinNotFound),
            1 => candidates.pop().ok_or(EngineError::PinNotFound),
            n => {
                warn!(candidates = n, trip_id = ?scope.trip_id, "PIN resolves to several tickets");
                Err(EngineError::AmbiguousPin { candidates: n })
            }
        }
    }
}

pub fn passenger_summary(
    booking: &Booking,
    ticket: &Ticket,
    verification: Option<&VerificationRecord>,
    clock: &dyn Clock,
) -> PassengerSummary {
    PassengerSummary {
        name: booking.passenger.name.clone(),
        phone: booking.passenger.phone.expose().clone(),
        email: booking.passenger.email.expose().clone(),
        booking_reference: booking.reference.clone(),
        ticket_number: ticket.ticket_number.clone(),
        tracking_pin: ticket.tracking_pin.clone(),
        seat_count: booking.seat_count,
        trip_id: booking.trip_id,
        verified_at: verification.map(|v| v.verified_at),
        verified_at_local: verification.map(|v| clock.local_time_label(v.verified_at)),
        has_geo: verification.is_some_and(|v| v.geo.is_some()),
    }
}
