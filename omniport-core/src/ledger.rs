use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::codes::CodeGenerator;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    Booking, BookingStatus, CancelOutcome, PassengerDetails, Reservation, ReserveOutcome, Ticket,
    TripInstance,
};
use crate::repository::{BookingStore, EngineStore, StoreError, TripRepository};
use crate::retry::{retry_transient, RetryPolicy};

/// Fresh codes are drawn this many times before giving up on collisions.
const MAX_CODE_ATTEMPTS: usize = 5;

/// A confirmed reservation as returned to the caller.
#[derive(Debug, Clone)]
pub struct ReservationReceipt {
    pub booking: Booking,
    pub ticket: Ticket,
    pub seats_available: i32,
}

#[derive(Debug, Clone)]
pub struct Cancellation {
    pub booking: Booking,
    /// Inventory after the release; `None` when nothing was released.
    pub seats_available: Option<i32>,
    pub already_cancelled: bool,
}

/// Owns every mutation of a trip's seat counter.
pub struct SeatLedger {
    store: Arc<dyn EngineStore>,
    clock: Arc<dyn Clock>,
    codes: CodeGenerator,
    retry: RetryPolicy,
    max_seats_per_booking: i32,
}

impl SeatLedger {
    pub fn new(
        store: Arc<dyn EngineStore>,
        clock: Arc<dyn Clock>,
        codes: CodeGenerator,
        retry: RetryPolicy,
        max_seats_per_booking: i32,
    ) -> Self {
        Self {
            store,
            clock,
            codes,
            retry,
            max_seats_per_booking: max_seats_per_booking.max(1),
        }
    }

    /// Reserve `seat_count` seats on a trip and issue the booking and ticket.
    ///
    /// The store decrements only if enough seats remain, in the same unit
    /// that writes the booking and ticket. A refused decrement leaves nothing
    /// behind.
    pub async fn reserve_seat(
        &self,
        trip_id: Uuid,
        passenger_ref: &str,
        passenger: PassengerDetails,
        seat_count: i32,
    ) -> EngineResult<ReservationReceipt> {
        if seat_count < 1 || seat_count > self.max_seats_per_booking {
            return Err(EngineError::InvalidRequest(format!(
                "seat count must be between 1 and {}",
                self.max_seats_per_booking
            )));
        }
        if passenger_ref.trim().is_empty() {
            return Err(EngineError::InvalidRequest("passenger identity is required".into()));
        }
        let passenger = passenger.normalized().map_err(EngineError::InvalidPassenger)?;

        let trip = self
            .store
            .get_trip(trip_id)
            .await?
            .ok_or(EngineError::TripNotFound(trip_id))?;
        if !trip.status.is_bookable() {
            return Err(EngineError::TripNotBookable {
                trip_id,
                status: trip.status,
            });
        }

        for attempt in 0..MAX_CODE_ATTEMPTS {
            let draft = self.draft(&trip, passenger_ref, &passenger, seat_count);
            let store = &self.store;
            let reservation = &draft;
            let outcome = retry_transient(&self.retry, "reserve_seat", move || async move {
                store.reserve(reservation).await.map_err(EngineError::from)
            })
            .await;

            let outcome = match outcome {
                Err(EngineError::Store(StoreError::Duplicate(constraint))) => {
                    debug!(attempt, %constraint, "Generated code collided, drawing new codes");
                    continue;
                }
                other => other?,
            };

            return match outcome {
                ReserveOutcome::Reserved {
                    booking,
                    ticket,
                    seats_available,
                } => {
                    info!(
                        booking_id = %booking.id,
                        trip_id = %trip_id,
                        reference = %booking.reference,
                        seats = seat_count,
                        seats_available,
                        "Booking confirmed"
                    );
                    Ok(ReservationReceipt {
                        booking,
                        ticket,
                        seats_available,
                    })
                }
                ReserveOutcome::SeatsUnavailable { available } => {
                    debug!(trip_id = %trip_id, requested = seat_count, available, "Trip fully booked");
                    Err(EngineError::SeatsUnavailable {
                        requested: seat_count,
                        available,
                    })
                }
                ReserveOutcome::NotBookable(status) => Err(EngineError::TripNotBookable { trip_id, status }),
                ReserveOutcome::TripMissing => Err(EngineError::TripNotFound(trip_id)),
            };
        }

        warn!(trip_id = %trip_id, "Could not draw unique booking codes");
        Err(EngineError::TryAgain {
            operation: "reserve_seat",
        })
    }

    /// Cancel a booking and give its seats back, never beyond the trip's
    /// total. Cancelling twice is a no-op.
    pub async fn cancel_booking(&self, booking_id: Uuid) -> EngineResult<Cancellation> {
        let now = self.clock.now();
        let store = &self.store;
        let outcome = retry_transient(&self.retry, "cancel_booking", move || async move {
            store.cancel_booking(booking_id, now).await.map_err(EngineError::from)
        })
        .await?;

        match outcome {
            CancelOutcome::Cancelled {
                booking,
                seats_available,
            } => {
                info!(
                    booking_id = %booking.id,
                    trip_id = %booking.trip_id,
                    seats_available,
                    "Booking cancelled"
                );
                Ok(Cancellation {
                    booking,
                    seats_available: Some(seats_available),
                    already_cancelled: false,
                })
            }
            CancelOutcome::AlreadyCancelled(booking) => {
                debug!(booking_id = %booking.id, "Booking already cancelled");
                Ok(Cancellation {
                    booking,
                    seats_available: None,
                    already_cancelled: true,
                })
            }
            CancelOutcome::NotCancellable(booking) => Err(EngineError::BookingNotCancellable(booking.id)),
            CancelOutcome::Missing => Err(EngineError::BookingNotFound(booking_id)),
        }
    }

    fn draft(
        &self,
        trip: &TripInstance,
        passenger_ref: &str,
        passenger: &PassengerDetails,
        seat_count: i32,
    ) -> Reservation {
        let now = self.clock.now();
        let booking = Booking {
            id: Uuid::new_v4(),
            trip_id: trip.id,
            passenger_ref: passenger_ref.to_string(),
            passenger: passenger.clone(),
            seat_count,
            total_amount: trip.price_per_seat * seat_count,
            status: BookingStatus::Confirmed,
            reference: self.codes.booking_reference(now),
            created_at: now,
            updated_at: now,
        };
        let ticket = Ticket {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            trip_id: trip.id,
            ticket_number: self.codes.ticket_number(trip.service_date),
            tracking_pin: self.codes.tracking_pin(),
            issued_at: now,
        };
        Reservation { booking, ticket }
    }
}
