//! Table rows and their conversion into engine models.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use omniport_core::models::{
    Booking, BusProfile, GeoPoint, PassengerDetails, ScheduleTemplate, Ticket, TripInstance,
    TripStatusEvent, VerificationRecord,
};
use omniport_core::StoreError;
use omniport_shared::Masked;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

pub(crate) const BUS_COLUMNS: &str = "id, name, total_seats, from_city, to_city, status";

pub(crate) const TEMPLATE_COLUMNS: &str =
    "id, bus_id, driver_id, day_of_week, departure_time, arrival_time, price_per_seat, active";

pub(crate) const TRIP_COLUMNS: &str = "id, template_id, bus_id, driver_id, service_date, \
     departure_time, arrival_time, price_per_seat, total_seats, seats_available, status, \
     inconsistent, created_at, updated_at";

pub(crate) const BOOKING_COLUMNS: &str = "id, trip_id, passenger_ref, passenger_name, \
     passenger_email, passenger_phone, seat_count, total_amount, status, reference, created_at, \
     updated_at";

pub(crate) const TICKET_COLUMNS: &str =
    "id, booking_id, trip_id, ticket_number, tracking_pin, issued_at";

pub(crate) const VERIFICATION_COLUMNS: &str = "id, ticket_id, trip_id, service_date, verified_by, \
     verified_at, method, latitude, longitude, notes";

pub(crate) const EVENT_COLUMNS: &str = "seq, id, trip_id, emitted_by, event_type, occurred_at, \
     recorded_at, message, latitude, longitude";

/// Prefixes every column in a list with a table alias, for joins.
pub(crate) fn qualified(alias: &str, columns: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// SQLSTATE codes worth retrying: serialization_failure, deadlock_detected,
/// lock_not_available.
const RETRYABLE_CODES: &[&str] = &["40001", "40P01", "55P03"];
const UNIQUE_VIOLATION: &str = "23505";

pub(crate) fn db_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::PoolTimedOut => StoreError::Transient(err.to_string()),
        sqlx::Error::Database(db) => {
            let code = db.code();
            match code.as_deref() {
                Some(c) if RETRYABLE_CODES.contains(&c) => StoreError::Transient(db.message().to_string()),
                Some(UNIQUE_VIOLATION) => {
                    StoreError::Duplicate(db.constraint().unwrap_or("unique").to_string())
                }
                _ => StoreError::Unexpected(err.to_string()),
            }
        }
        _ => StoreError::Unexpected(err.to_string()),
    }
}

pub(crate) fn parse_label<T>(value: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| StoreError::Unexpected(e.to_string()))
}

pub(crate) fn geo(latitude: Option<f64>, longitude: Option<f64>) -> Option<GeoPoint> {
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(GeoPoint { latitude, longitude }),
        _ => None,
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct BusRow {
    id: Uuid,
    name: String,
    total_seats: i32,
    from_city: String,
    to_city: String,
    status: String,
}

impl TryFrom<BusRow> for BusProfile {
    type Error = StoreError;

    fn try_from(row: BusRow) -> Result<Self, Self::Error> {
        Ok(BusProfile {
            id: row.id,
            name: row.name,
            total_seats: row.total_seats,
            from_city: row.from_city,
            to_city: row.to_city,
            status: parse_label(&row.status)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct TemplateRow {
    id: Uuid,
    bus_id: Uuid,
    driver_id: Option<Uuid>,
    day_of_week: i16,
    departure_time: NaiveTime,
    arrival_time: NaiveTime,
    price_per_seat: i32,
    active: bool,
}

impl From<TemplateRow> for ScheduleTemplate {
    fn from(row: TemplateRow) -> Self {
        ScheduleTemplate {
            id: row.id,
            bus_id: row.bus_id,
            driver_id: row.driver_id,
            day_of_week: row.day_of_week.clamp(0, 7) as u8,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            price_per_seat: row.price_per_seat,
            active: row.active,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct TripRow {
    id: Uuid,
    template_id: Uuid,
    bus_id: Uuid,
    driver_id: Option<Uuid>,
    service_date: NaiveDate,
    departure_time: NaiveTime,
    arrival_time: NaiveTime,
    price_per_seat: i32,
    total_seats: i32,
    seats_available: i32,
    status: String,
    inconsistent: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TripRow> for TripInstance {
    type Error = StoreError;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        Ok(TripInstance {
            id: row.id,
            template_id: row.template_id,
            bus_id: row.bus_id,
            driver_id: row.driver_id,
            service_date: row.service_date,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            price_per_seat: row.price_per_seat,
            total_seats: row.total_seats,
            seats_available: row.seats_available,
            status: parse_label(&row.status)?,
            inconsistent: row.inconsistent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct BookingRow {
    id: Uuid,
    trip_id: Uuid,
    passenger_ref: String,
    passenger_name: String,
    passenger_email: String,
    passenger_phone: String,
    seat_count: i32,
    total_amount: i32,
    status: String,
    reference: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            trip_id: row.trip_id,
            passenger_ref: row.passenger_ref,
            passenger: PassengerDetails {
                name: row.passenger_name,
                email: Masked(row.passenger_email),
                phone: Masked(row.passenger_phone),
            },
            seat_count: row.seat_count,
            total_amount: row.total_amount,
            status: parse_label(&row.status)?,
            reference: row.reference,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct TicketRow {
    id: Uuid,
    booking_id: Uuid,
    trip_id: Uuid,
    ticket_number: String,
    tracking_pin: String,
    issued_at: DateTime<Utc>,
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Ticket {
            id: row.id,
            booking_id: row.booking_id,
            trip_id: row.trip_id,
            ticket_number: row.ticket_number,
            tracking_pin: row.tracking_pin,
            issued_at: row.issued_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct VerificationRow {
    id: Uuid,
    ticket_id: Uuid,
    trip_id: Uuid,
    service_date: NaiveDate,
    verified_by: String,
    verified_at: DateTime<Utc>,
    method: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    notes: Option<String>,
}

impl TryFrom<VerificationRow> for VerificationRecord {
    type Error = StoreError;

    fn try_from(row: VerificationRow) -> Result<Self, Self::Error> {
        Ok(VerificationRecord {
            id: row.id,
            ticket_id: row.ticket_id,
            trip_id: row.trip_id,
            service_date: row.service_date,
            verified_by: row.verified_by,
            verified_at: row.verified_at,
            method: parse_label(&row.method)?,
            geo: geo(row.latitude, row.longitude),
            notes: row.notes,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct EventRow {
    seq: i64,
    id: Uuid,
    trip_id: Uuid,
    emitted_by: String,
    event_type: String,
    occurred_at: DateTime<Utc>,
    recorded_at: DateTime<Utc>,
    message: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl TryFrom<EventRow> for TripStatusEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(TripStatusEvent {
            id: row.id,
            seq: row.seq,
            trip_id: row.trip_id,
            emitted_by: row.emitted_by,
            event_type: parse_label(&row.event_type)?,
            occurred_at: row.occurred_at,
            recorded_at: row.recorded_at,
            message: row.message,
            geo: geo(row.latitude, row.longitude),
        })
    }
}

/// Converts a batch of rows, failing on the first bad label.
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use omniport_core::models::{TripEventType, TripStatus};

    #[test]
    fn test_geo_requires_both_coordinates() {
        assert_eq!(
            geo(Some(6.93), Some(79.85)),
            Some(GeoPoint { latitude: 6.93, longitude: 79.85 })
        );
        assert_eq!(geo(Some(6.93), None), None);
    }

    #[test]
    fn test_unknown_status_label_is_unexpected() {
        assert!(matches!(parse_label::<TripStatus>("DEPARTED"), Err(StoreError::Unexpected(_))));
        assert_eq!(parse_label::<TripEventType>("ROUTE_CHANGE").unwrap(), TripEventType::RouteChange);
    }

    #[test]
    fn test_qualified_columns() {
        assert_eq!(
            qualified("t", TICKET_COLUMNS),
            "t.id, t.booking_id, t.trip_id, t.ticket_number, t.tracking_pin, t.issued_at"
        );
    }

    #[test]
    fn test_pool_timeout_is_transient() {
        assert!(matches!(db_error(sqlx::Error::PoolTimedOut), StoreError::Transient(_)));
        assert!(matches!(db_error(sqlx::Error::RowNotFound), StoreError::Unexpected(_)));
    }
}
