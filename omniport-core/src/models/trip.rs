use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::schedule::{BusProfile, ScheduleTemplate};
use super::status_event::TripEventType;
use super::UnknownVariant;

/// Natural key of a trip instance. Exactly one instance exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TripKey {
    pub bus_id: Uuid,
    pub service_date: NaiveDate,
    pub departure_time: NaiveTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Scheduled,
    Boarding,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Scheduled => "SCHEDULED",
            TripStatus::Boarding => "BOARDING",
            TripStatus::InProgress => "IN_PROGRESS",
            TripStatus::Completed => "COMPLETED",
            TripStatus::Cancelled => "CANCELLED",
        }
    }

    /// Seats can only be reserved before departure.
    pub fn is_bookable(&self) -> bool {
        matches!(self, TripStatus::Scheduled | TripStatus::Boarding)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }

    /// Derived status after a driver event.
    ///
    /// Only Departure and Arrival move the state; the first of each wins and
    /// later re-emissions never regress it. An Arrival without a prior
    /// Departure still completes the trip but is flagged. Cancelled is an
    /// operator decision and no driver event leaves it.
    pub fn apply(self, event: TripEventType) -> StatusTransition {
        let (next, inconsistent) = match (self, event) {
            (TripStatus::Cancelled, _) => (self, false),
            (TripStatus::Scheduled | TripStatus::Boarding, TripEventType::Departure) => {
                (TripStatus::InProgress, false)
            }
            (TripStatus::InProgress, TripEventType::Arrival) => (TripStatus::Completed, false),
            (TripStatus::Scheduled | TripStatus::Boarding, TripEventType::Arrival) => {
                (TripStatus::Completed, true)
            }
            _ => (self, false),
        };
        StatusTransition {
            previous: self,
            next,
            inconsistent,
        }
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(TripStatus::Scheduled),
            "BOARDING" => Ok(TripStatus::Boarding),
            "IN_PROGRESS" => Ok(TripStatus::InProgress),
            "COMPLETED" => Ok(TripStatus::Completed),
            "CANCELLED" => Ok(TripStatus::Cancelled),
            _ => Err(UnknownVariant { kind: "trip status", value: s.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub previous: TripStatus,
    pub next: TripStatus,
    /// Set when the event contradicts the current state (arrival without
    /// departure). Surfaced to operators, never fatal.
    pub inconsistent: bool,
}

impl StatusTransition {
    pub fn changed(&self) -> bool {
        self.previous != self.next
    }
}

/// A template materialized for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripInstance {
    pub id: Uuid,
    pub template_id: Uuid,
    pub bus_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub service_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub arrival_time: NaiveTime,
    pub price_per_seat: i32,
    /// Ceiling copied from the bus at materialization time.
    pub total_seats: i32,
    pub seats_available: i32,
    pub status: TripStatus,
    pub inconsistent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TripInstance {
    pub fn materialize(
        template: &ScheduleTemplate,
        bus: &BusProfile,
        service_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        let total_seats = bus.total_seats.max(0);
        Self {
            id: Uuid::new_v4(),
            template_id: template.id,
            bus_id: template.bus_id,
            driver_id: template.driver_id,
            service_date,
            departure_time: template.departure_time,
            arrival_time: template.arrival_time,
            price_per_seat: template.price_per_seat,
            total_seats,
            seats_available: total_seats,
            status: TripStatus::Scheduled,
            inconsistent: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> TripKey {
        TripKey {
            bus_id: self.bus_id,
            service_date: self.service_date,
            departure_time: self.departure_time,
        }
    }

    pub fn seats_booked(&self) -> i32 {
        self.total_seats - self.seats_available
    }

    /// Whether `identity` may act as this trip's driver. A trip without an
    /// assigned driver accepts any driver.
    pub fn is_served_by(&self, identity: &str) -> bool {
        match self.driver_id {
            None => true,
            Some(driver_id) => Uuid::parse_str(identity.trim()).is_ok_and(|id| id == driver_id),
        }
    }

    /// Bookings on a trip that has left can no longer be cancelled.
    pub fn allows_booking_cancellation(&self) -> bool {
        !matches!(self.status, TripStatus::InProgress | TripStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_departure_then_arrival() {
        let t = TripStatus::Scheduled.apply(TripEventType::Departure);
        assert_eq!(t.next, TripStatus::InProgress);
        assert!(t.changed());
        assert!(!t.inconsistent);

        let t = TripStatus::InProgress.apply(TripEventType::Arrival);
        assert_eq!(t.next, TripStatus::Completed);
        assert!(!t.inconsistent);
    }

    #[test]
    fn test_boarding_departs() {
        assert_eq!(
            TripStatus::Boarding.apply(TripEventType::Departure).next,
            TripStatus::InProgress
        );
    }

    #[test]
    fn test_repeated_departure_does_not_regress() {
        let t = TripStatus::InProgress.apply(TripEventType::Departure);
        assert_eq!(t.next, TripStatus::InProgress);
        assert!(!t.changed());

        let t = TripStatus::Completed.apply(TripEventType::Departure);
        assert_eq!(t.next, TripStatus::Completed);
    }

    #[test]
    fn test_arrival_without_departure_is_flagged() {
        let t = TripStatus::Scheduled.apply(TripEventType::Arrival);
        assert_eq!(t.next, TripStatus::Completed);
        assert!(t.inconsistent);
    }

    #[test]
    fn test_informational_events_keep_state() {
        for event in [
            TripEventType::Delay,
            TripEventType::Breakdown,
            TripEventType::RouteChange,
            TripEventType::StatusNote,
        ] {
            let t = TripStatus::InProgress.apply(event);
            assert_eq!(t.next, TripStatus::InProgress);
            assert!(!t.inconsistent);
        }
    }

    #[test]
    fn test_cancelled_is_sticky() {
        for event in [TripEventType::Departure, TripEventType::Arrival] {
            let t = TripStatus::Cancelled.apply(event);
            assert_eq!(t.next, TripStatus::Cancelled);
            assert!(!t.inconsistent);
        }
    }

    fn trip_with_driver(driver_id: Option<Uuid>) -> TripInstance {
        let now = Utc::now();
        TripInstance {
            id: Uuid::new_v4(),
            template_id: Uuid::new_v4(),
            bus_id: Uuid::new_v4(),
            driver_id,
            service_date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            departure_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            arrival_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            price_per_seat: 1000,
            total_seats: 20,
            seats_available: 20,
            status: TripStatus::Scheduled,
            inconsistent: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_assigned_driver_only() {
        let driver = Uuid::new_v4();
        let trip = trip_with_driver(Some(driver));
        assert!(trip.is_served_by(&driver.to_string()));
        assert!(trip.is_served_by(&driver.to_string().to_uppercase()));
        assert!(!trip.is_served_by(&Uuid::new_v4().to_string()));
        assert!(!trip.is_served_by("driver-1"));

        let open = trip_with_driver(None);
        assert!(open.is_served_by("driver-1"));
    }

    #[test]
    fn test_booking_cancellation_closes_at_departure() {
        let mut trip = trip_with_driver(None);
        assert!(trip.allows_booking_cancellation());
        trip.status = TripStatus::Boarding;
        assert!(trip.allows_booking_cancellation());
        trip.status = TripStatus::InProgress;
        assert!(!trip.allows_booking_cancellation());
        trip.status = TripStatus::Completed;
        assert!(!trip.allows_booking_cancellation());
    }

    #[test]
    fn test_status_labels_parse_back() {
        for status in [
            TripStatus::Scheduled,
            TripStatus::Boarding,
            TripStatus::InProgress,
            TripStatus::Completed,
            TripStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<TripStatus>().unwrap(), status);
        }
        assert!("DEPARTED".parse::<TripStatus>().is_err());
    }
}
