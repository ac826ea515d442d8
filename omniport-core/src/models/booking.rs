use chrono::{DateTime, Utc};
use omniport_shared::Masked;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::trip::TripStatus;
use super::UnknownVariant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerDetails {
    pub name: String,
    pub email: Masked<String>,
    pub phone: Masked<String>,
}

impl PassengerDetails {
    /// All three fields are required; values are trimmed in place.
    pub fn normalized(self) -> Result<Self, String> {
        let name = self.name.trim().to_string();
        let email = self.email.into_inner().trim().to_string();
        let phone = self.phone.into_inner().trim().to_string();

        if name.is_empty() {
            return Err("passenger name is required".into());
        }
        if email.is_empty() {
            return Err("passenger email is required".into());
        }
        let well_formed = email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'))
            .unwrap_or(false);
        if !well_formed {
            return Err("passenger email is malformed".into());
        }
        let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
        if digits < 7 {
            return Err("passenger phone number is too short".into());
        }
        if phone
            .chars()
            .any(|c| !(c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')')))
        {
            return Err("passenger phone number contains invalid characters".into());
        }

        Ok(Self {
            name,
            email: Masked(email),
            phone: Masked(phone),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "COMPLETED" => Ok(BookingStatus::Completed),
            _ => Err(UnknownVariant { kind: "booking status", value: s.to_string() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub trip_id: Uuid,
    /// Identity of the booking passenger, as supplied by the auth layer.
    pub passenger_ref: String,
    pub passenger: PassengerDetails,
    pub seat_count: i32,
    pub total_amount: i32,
    pub status: BookingStatus,
    pub reference: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub booking_id: Uuid,
    /// Denormalized so the PIN can be kept unique within its trip.
    pub trip_id: Uuid,
    pub ticket_number: String,
    pub tracking_pin: String,
    pub issued_at: DateTime<Utc>,
}

/// Booking and ticket drafted by the ledger, persisted together with the
/// seat decrement or not at all.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub booking: Booking,
    pub ticket: Ticket,
}

#[derive(Debug, Clone)]
pub enum ReserveOutcome {
    Reserved {
        booking: Booking,
        ticket: Ticket,
        seats_available: i32,
    },
    SeatsUnavailable { available: i32 },
    NotBookable(TripStatus),
    TripMissing,
}

#[derive(Debug, Clone)]
pub enum CancelOutcome {
    Cancelled { booking: Booking, seats_available: i32 },
    AlreadyCancelled(Booking),
    NotCancellable(Booking),
    Missing,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(name: &str, email: &str, phone: &str) -> PassengerDetails {
        PassengerDetails {
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
        }
    }

    #[test]
    fn test_passenger_details_are_trimmed() {
        let p = details("  Nimal Perera ", " nimal@example.com ", " +94 77 123 4567 ")
            .normalized()
            .unwrap();
        assert_eq!(p.name, "Nimal Perera");
        assert_eq!(p.email.expose(), "nimal@example.com");
        assert_eq!(p.phone.expose(), "+94 77 123 4567");
    }

    #[test]
    fn test_passenger_details_rejects_missing_fields() {
        assert!(details("", "a@b.lk", "0771234567").normalized().is_err());
        assert!(details("A", "", "0771234567").normalized().is_err());
        assert!(details("A", "not-an-email", "0771234567").normalized().is_err());
        assert!(details("A", "a@b.lk", "123").normalized().is_err());
        assert!(details("A", "a@b.lk", "0771234567x").normalized().is_err());
    }

    #[test]
    fn test_passenger_contact_is_masked_in_debug() {
        let p = details("Nimal", "nimal@example.com", "0771234567");
        let debug = format!("{:?}", p);
        assert!(!debug.contains("nimal@example.com"));
        assert!(!debug.contains("0771234567"));
    }
}
