use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    AppendOutcome, GeoPoint, NewTripEvent, TripEventType, TripInstance, TripStatus, TripStatusEvent,
};
use crate::repository::{EngineStore, StoreError, TripEventStore, TripRepository};

#[derive(Debug, Clone)]
pub struct ReportEvent {
    pub trip_id: Uuid,
    pub emitted_by: String,
    pub event_type: TripEventType,
    pub message: Option<String>,
    /// Defaults to the server clock.
    pub occurred_at: Option<DateTime<Utc>>,
    pub geo: Option<GeoPoint>,
}

/// Current state of a trip plus its full timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TripStatusView {
    pub trip: TripInstance,
    pub state: TripStatus,
    pub inconsistent: bool,
    pub events: Vec<TripStatusEvent>,
}

/// Append-only per-trip event log. Departure and Arrival also move the
/// trip's derived status.
pub struct TripStatusLog {
    store: Arc<dyn EngineStore>,
    clock: Arc<dyn Clock>,
}

impl TripStatusLog {
    pub fn new(store: Arc<dyn EngineStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn append_event(&self, report: ReportEvent) -> EngineResult<AppendOutcome> {
        if report.emitted_by.trim().is_empty() {
            return Err(EngineError::InvalidRequest("emitter identity is required".into()));
        }
        if let Some(geo) = &report.geo {
            geo.validate().map_err(EngineError::InvalidRequest)?;
        }
        let message = match report.message.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => report
                .event_type
                .default_message()
                .map(str::to_string)
                .ok_or_else(|| {
                    EngineError::InvalidRequest(format!(
                        "a message is required for {} events",
                        report.event_type
                    ))
                })?,
        };

        let trip = self.require_trip(report.trip_id).await?;
        if !trip.is_served_by(&report.emitted_by) {
            warn!(
                trip_id = %trip.id,
                emitted_by = %report.emitted_by,
                "Event refused from a driver not assigned to the trip"
            );
            return Err(EngineError::NotAssignedDriver { trip_id: trip.id });
        }

        let now = self.clock.now();
        let event = NewTripEvent {
            id: Uuid::new_v4(),
            trip_id: report.trip_id,
            emitted_by: report.emitted_by,
            event_type: report.event_type,
            occurred_at: report.occurred_at.unwrap_or(now),
            recorded_at: now,
            message,
            geo: report.geo,
        };

        let outcome = self.store.append_event(&event).await.map_err(|err| match err {
            StoreError::NotFound(_) => EngineError::TripNotFound(event.trip_id),
            other => EngineError::Store(other),
        })?;

        let transition = outcome.transition;
        if transition.inconsistent {
            warn!(
                trip_id = %event.trip_id,
                previous = %transition.previous,
                event = %event.event_type,
                "Arrival reported without departure, trip flagged"
            );
        }
        if transition.changed() {
            info!(
                trip_id = %event.trip_id,
                from = %transition.previous,
                to = %transition.next,
                "Trip status changed"
            );
        } else if outcome.trip.status == TripStatus::Cancelled && event.event_type.drives_status() {
            warn!(trip_id = %event.trip_id, event = %event.event_type, "Event logged against a cancelled trip");
        }

        Ok(outcome)
    }

    pub async fn list_events(&self, trip_id: Uuid) -> EngineResult<Vec<TripStatusEvent>> {
        self.require_trip(trip_id).await?;
        Ok(self.store.list_events(trip_id).await?)
    }

    pub async fn trip_status(&self, trip_id: Uuid) -> EngineResult<TripStatusView> {
        let trip = self.require_trip(trip_id).await?;
        let events = self.store.list_events(trip_id).await?;
        Ok(TripStatusView {
            state: trip.status,
            inconsistent: trip.inconsistent,
            trip,
            events,
        })
    }

    async fn require_trip(&self, trip_id: Uuid) -> EngineResult<TripInstance> {
        self.store
            .get_trip(trip_id)
            .await?
            .ok_or(EngineError::TripNotFound(trip_id))
    }
}
