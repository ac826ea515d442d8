use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::AppError;
use crate::state::AppState;

pub struct Metrics {
    registry: Registry,
    pub bookings: IntCounterVec,
    pub verifications: IntCounterVec,
    pub trip_events: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let bookings = counter(&registry, "omniport_bookings_total", "Seat reservations by outcome", "outcome")?;
        let verifications = counter(
            &registry,
            "omniport_verifications_total",
            "Boarding verifications by outcome",
            "outcome",
        )?;
        let trip_events = counter(&registry, "omniport_trip_events_total", "Trip status events by type", "type")?;
        Ok(Self {
            registry,
            bookings,
            verifications,
            trip_events,
        })
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn counter(registry: &Registry, name: &str, help: &str, label: &str) -> Result<IntCounterVec, prometheus::Error> {
    let vec = IntCounterVec::new(Opts::new(name, help), &[label])?;
    registry.register(Box::new(vec.clone()))?;
    Ok(vec)
}

/// Outcome label for a finished engine call.
pub fn outcome<T>(result: &Result<T, omniport_core::EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => match e.class() {
            omniport_core::ErrorClass::Validation => "rejected",
            omniport_core::ErrorClass::Capacity => "sold_out",
            omniport_core::ErrorClass::Integrity => "conflict",
            omniport_core::ErrorClass::Transient => "retry_exhausted",
            omniport_core::ErrorClass::Fatal => "error",
        },
    }
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics.render().map_err(anyhow::Error::from)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use omniport_core::EngineError;

    #[test]
    fn test_render_includes_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.bookings.with_label_values(&["ok"]).inc();
        metrics.trip_events.with_label_values(&["DEPARTURE"]).inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("omniport_bookings_total{outcome=\"ok\"} 1"));
        assert!(text.contains("omniport_trip_events_total{type=\"DEPARTURE\"} 1"));
    }

    #[test]
    fn test_outcome_labels() {
        let full: Result<(), EngineError> = Err(EngineError::SeatsUnavailable { requested: 1, available: 0 });
        assert_eq!(outcome(&full), "sold_out");
        assert_eq!(outcome(&Ok::<_, EngineError>(())), "ok");
    }
}
