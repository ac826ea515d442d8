use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{day_number, TripStatus};
use crate::repository::{EngineStore, ScheduleDirectory, TripRepository};

#[derive(Debug, Deserialize)]
pub struct TripSearchRequest {
    pub from: String,
    pub to: String,
    pub date: NaiveDate,
}

/// One departure on the requested day. `trip_id` is `None` until someone
/// books it; seats then come from the bus capacity.
#[derive(Debug, Clone, Serialize)]
pub struct TripSearchResult {
    pub template_id: Uuid,
    pub trip_id: Option<Uuid>,
    pub bus_id: Uuid,
    pub bus_name: String,
    pub from_city: String,
    pub to_city: String,
    pub service_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub arrival_time: NaiveTime,
    pub price_per_seat: i32,
    pub total_seats: i32,
    pub seats_available: i32,
    pub status: TripStatus,
    pub bookable: bool,
}

/// Read-only projection over templates and already materialized trips.
/// Searching never creates a trip.
pub struct TripSearch {
    store: Arc<dyn EngineStore>,
}

impl TripSearch {
    pub fn new(store: Arc<dyn EngineStore>) -> Self {
        Self { store }
    }

    pub async fn search(&self, request: &TripSearchRequest) -> EngineResult<Vec<TripSearchResult>> {
        let from = request.from.trim();
        let to = request.to.trim();
        if from.is_empty() || to.is_empty() {
            return Err(EngineError::InvalidRequest("origin and destination are required".into()));
        }

        let day = day_number(request.date);
        let mut results = Vec::new();
        for bus in self.store.list_buses_on_route(from, to).await? {
            for template in self.store.list_active_templates(bus.id, day).await? {
                let existing = self.store.find_trip(&template.trip_key(request.date)).await?;
                let (trip_id, price_per_seat, total_seats, seats_available, status) = match existing {
                    Some(trip) => (
                        Some(trip.id),
                        trip.price_per_seat,
                        trip.total_seats,
                        trip.seats_available,
                        trip.status,
                    ),
                    None => (
                        None,
                        template.price_per_seat,
                        bus.total_seats,
                        bus.total_seats,
                        TripStatus::Scheduled,
                    ),
                };
                results.push(TripSearchResult {
                    template_id: template.id,
                    trip_id,
                    bus_id: bus.id,
                    bus_name: bus.name.clone(),
                    from_city: bus.from_city.clone(),
                    to_city: bus.to_city.clone(),
                    service_date: request.date,
                    departure_time: template.departure_time,
                    arrival_time: template.arrival_time,
                    price_per_seat,
                    total_seats,
                    seats_available,
                    status,
                    bookable: status.is_bookable() && seats_available > 0,
                });
            }
        }
        results.sort_by_key(|r| r.departure_time);
        Ok(results)
    }
}
