use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

// Payloads handed to the external notification service. Delivery
// (push/SMS/email) happens outside the engine.

pub const TOPIC_BOOKING_CONFIRMED: &str = "booking.confirmed";
pub const TOPIC_BOOKING_CANCELLED: &str = "booking.cancelled";
pub const TOPIC_BOARDING_VERIFIED: &str = "boarding.verified";
pub const TOPIC_TRIP_STATUS: &str = "trip.status";

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub passenger_ref: String,
    pub booking_reference: String,
    pub ticket_number: String,
    pub service_date: NaiveDate,
    pub seats_available: i32,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingCancelledEvent {
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub booking_reference: String,
    pub seats_available: i32,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BoardingVerifiedEvent {
    pub verification_id: Uuid,
    pub ticket_id: Uuid,
    pub trip_id: Uuid,
    pub verified_by: String,
    pub verified_at: DateTime<Utc>,
}

/// Fan-out copy of a trip status event, consumed by the SSE stream and Kafka.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct TripStatusNotice {
    pub event_id: Uuid,
    pub trip_id: Uuid,
    pub event_type: String,
    pub trip_status: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
    pub inconsistent: bool,
}
