use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::geo::GeoPoint;
use super::trip::{StatusTransition, TripInstance};
use super::UnknownVariant;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripEventType {
    Departure,
    Arrival,
    Delay,
    Breakdown,
    RouteChange,
    StatusNote,
}

impl TripEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripEventType::Departure => "DEPARTURE",
            TripEventType::Arrival => "ARRIVAL",
            TripEventType::Delay => "DELAY",
            TripEventType::Breakdown => "BREAKDOWN",
            TripEventType::RouteChange => "ROUTE_CHANGE",
            TripEventType::StatusNote => "STATUS_NOTE",
        }
    }

    /// Departure and Arrival drive the trip state; the rest are notes.
    pub fn drives_status(&self) -> bool {
        matches!(self, TripEventType::Departure | TripEventType::Arrival)
    }

    /// Message used when a driver taps Departure/Arrival without text.
    pub fn default_message(&self) -> Option<&'static str> {
        match self {
            TripEventType::Departure => Some("Trip started"),
            TripEventType::Arrival => Some("Trip completed"),
            _ => None,
        }
    }
}

impl fmt::Display for TripEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripEventType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPARTURE" => Ok(TripEventType::Departure),
            "ARRIVAL" => Ok(TripEventType::Arrival),
            "DELAY" => Ok(TripEventType::Delay),
            "BREAKDOWN" => Ok(TripEventType::Breakdown),
            "ROUTE_CHANGE" => Ok(TripEventType::RouteChange),
            "STATUS_NOTE" => Ok(TripEventType::StatusNote),
            _ => Err(UnknownVariant { kind: "trip event type", value: s.to_string() }),
        }
    }
}

/// One entry of a trip's append-only status log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripStatusEvent {
    pub id: Uuid,
    /// Store-assigned insertion order; breaks `occurred_at` ties.
    pub seq: i64,
    pub trip_id: Uuid,
    pub emitted_by: String,
    pub event_type: TripEventType,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub message: String,
    pub geo: Option<GeoPoint>,
}

#[derive(Debug, Clone)]
pub struct NewTripEvent {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub emitted_by: String,
    pub event_type: TripEventType,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub message: String,
    pub geo: Option<GeoPoint>,
}

#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub event: TripStatusEvent,
    pub trip: TripInstance,
    pub transition: StatusTransition,
}
