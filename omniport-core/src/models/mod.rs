pub mod booking;
pub mod geo;
pub mod schedule;
pub mod status_event;
pub mod trip;
pub mod verification;

pub use booking::{Booking, BookingStatus, CancelOutcome, PassengerDetails, Reservation, ReserveOutcome, Ticket};
pub use geo::GeoPoint;
pub use schedule::{day_number, BusProfile, BusStatus, ScheduleTemplate};
pub use status_event::{AppendOutcome, NewTripEvent, TripEventType, TripStatusEvent};
pub use trip::{StatusTransition, TripInstance, TripKey, TripStatus};
pub use verification::{
    DateWindow, PassengerSummary, PinScope, TicketContext, VerificationMethod, VerificationRecord,
    VerifyOutcome,
};

/// Error raised when a persisted enum label is not recognised.
#[derive(Debug, thiserror::Error)]
#[error("Unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
