use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::booking::{Booking, Ticket};
use super::geo::GeoPoint;
use super::trip::TripInstance;
use super::UnknownVariant;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationMethod {
    /// PIN typed in by the driver.
    #[default]
    Manual,
    /// PIN read from the passenger's QR code.
    Scan,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::Manual => "MANUAL",
            VerificationMethod::Scan => "SCAN",
        }
    }
}

impl fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MANUAL" => Ok(VerificationMethod::Manual),
            "SCAN" => Ok(VerificationMethod::Scan),
            _ => Err(UnknownVariant { kind: "verification method", value: s.to_string() }),
        }
    }
}

/// Proof that a ticket was checked on a given service day. At most one per
/// (ticket, service_date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub trip_id: Uuid,
    pub service_date: NaiveDate,
    pub verified_by: String,
    pub verified_at: DateTime<Utc>,
    pub method: VerificationMethod,
    pub geo: Option<GeoPoint>,
    pub notes: Option<String>,
}

/// Everything the verifier needs about a PIN match.
#[derive(Debug, Clone)]
pub struct TicketContext {
    pub ticket: Ticket,
    pub booking: Booking,
    pub trip: TripInstance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateWindow {
    /// Trips running on exactly this service day.
    On(NaiveDate),
    /// Trips running on or after this day.
    From(NaiveDate),
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        match self {
            DateWindow::On(day) => date == *day,
            DateWindow::From(day) => date >= *day,
        }
    }
}

/// Lookup criteria for PIN resolution.
#[derive(Debug, Clone)]
pub struct PinScope {
    pub pin: String,
    pub window: DateWindow,
    pub trip_id: Option<Uuid>,
    /// When set, trips with an assigned driver only match if that driver
    /// is this identity.
    pub served_by: Option<String>,
}

#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    Recorded(VerificationRecord),
    /// A record already existed for the (ticket, day); the prior one is kept.
    AlreadyVerified(VerificationRecord),
}

/// Manifest row shown to drivers and operators.
#[derive(Debug, Clone, Serialize)]
pub struct PassengerSummary {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub booking_reference: String,
    pub ticket_number: String,
    pub tracking_pin: String,
    pub seat_count: i32,
    pub trip_id: Uuid,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_at_local: Option<String>,
    pub has_geo: bool,
}
