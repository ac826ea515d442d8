use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::trip::TripKey;
use super::UnknownVariant;

/// ISO day number of a date: 1 = Monday ... 7 = Sunday.
pub fn day_number(date: NaiveDate) -> u8 {
    date.weekday().number_from_monday() as u8
}

/// Recurring weekly departure of one bus. Owned by the owner console;
/// the engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTemplate {
    pub id: Uuid,
    pub bus_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub day_of_week: u8,
    pub departure_time: NaiveTime,
    pub arrival_time: NaiveTime,
    pub price_per_seat: i32,
    pub active: bool,
}

impl ScheduleTemplate {
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        day_number(date) == self.day_of_week
    }

    pub fn trip_key(&self, service_date: NaiveDate) -> TripKey {
        TripKey {
            bus_id: self.bus_id,
            service_date,
            departure_time: self.departure_time,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusStatus {
    Active,
    Maintenance,
    Inactive,
}

impl BusStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusStatus::Active => "ACTIVE",
            BusStatus::Maintenance => "MAINTENANCE",
            BusStatus::Inactive => "INACTIVE",
        }
    }
}

impl fmt::Display for BusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BusStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(BusStatus::Active),
            "MAINTENANCE" => Ok(BusStatus::Maintenance),
            "INACTIVE" => Ok(BusStatus::Inactive),
            _ => Err(UnknownVariant { kind: "bus status", value: s.to_string() }),
        }
    }
}

/// Fleet record, managed outside the engine. `total_seats` is the ceiling
/// for every trip's inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusProfile {
    pub id: Uuid,
    pub name: String,
    pub total_seats: i32,
    pub from_city: String,
    pub to_city: String,
    pub status: BusStatus,
}
