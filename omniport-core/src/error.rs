use chrono::{DateTime, NaiveDate, Utc, Weekday};
use uuid::Uuid;

use crate::models::TripStatus;
use crate::repository::StoreError;

/// Broad grouping of engine failures, used to decide how loudly to log and
/// what the caller gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rejected before any mutation; reported verbatim.
    Validation,
    /// Expected and frequent ("fully booked"); never a fault.
    Capacity,
    /// Guard tripped (already verified, ambiguous PIN); carries context.
    Integrity,
    /// Store contention that outlived the local retries.
    Transient,
    /// Store unreachable, broken references. Propagated as is.
    Fatal,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Schedule template not found: {0}")]
    TemplateNotFound(Uuid),

    #[error("Schedule template {0} is not active")]
    TemplateInactive(Uuid),

    #[error("Service date {date} is a {actual}, template runs on day {expected} of the week")]
    DateMismatch {
        date: NaiveDate,
        expected: u8,
        actual: Weekday,
    },

    #[error("Bus not found: {0}")]
    BusNotFound(Uuid),

    #[error("Trip not found: {0}")]
    TripNotFound(Uuid),

    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Invalid passenger details: {0}")]
    InvalidPassenger(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Trip {trip_id} is {status} and does not accept bookings")]
    TripNotBookable { trip_id: Uuid, status: TripStatus },

    #[error("Trip {trip_id} is {status} and cannot be cancelled")]
    TripNotCancellable { trip_id: Uuid, status: TripStatus },

    #[error("Booking {0} can no longer be cancelled, the trip has departed")]
    BookingNotCancellable(Uuid),

    #[error("Trip {trip_id} is assigned to another driver")]
    NotAssignedDriver { trip_id: Uuid },

    #[error("Seats unavailable: requested {requested}, available {available}")]
    SeatsUnavailable { requested: i32, available: i32 },

    #[error("No ticket matches this PIN")]
    PinNotFound,

    #[error("PIN matches {candidates} tickets; narrow the search to a trip")]
    AmbiguousPin { candidates: usize },

    #[error("Ticket {ticket_number} already verified at {local_time}")]
    AlreadyVerified {
        ticket_number: String,
        verified_at: DateTime<Utc>,
        /// `HH:MM` in the service timezone, ready for display.
        local_time: String,
    },

    #[error("{operation} did not complete, try again")]
    TryAgain { operation: &'static str },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::TemplateNotFound(_)
            | EngineError::TemplateInactive(_)
            | EngineError::DateMismatch { .. }
            | EngineError::BusNotFound(_)
            | EngineError::TripNotFound(_)
            | EngineError::BookingNotFound(_)
            | EngineError::InvalidPassenger(_)
            | EngineError::InvalidRequest(_)
            | EngineError::TripNotBookable { .. }
            | EngineError::TripNotCancellable { .. }
            | EngineError::BookingNotCancellable(_)
            | EngineError::NotAssignedDriver { .. } => ErrorClass::Validation,
            EngineError::SeatsUnavailable { .. } => ErrorClass::Capacity,
            EngineError::PinNotFound
            | EngineError::AmbiguousPin { .. }
            | EngineError::AlreadyVerified { .. } => ErrorClass::Integrity,
            EngineError::TryAgain { .. } => ErrorClass::Transient,
            EngineError::Store(StoreError::Transient(_)) => ErrorClass::Transient,
            EngineError::Store(_) => ErrorClass::Fatal,
        }
    }

    /// True for store failures worth retrying in place.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Store(StoreError::Transient(_)))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
