use chrono::{Datelike, NaiveDate};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::models::{ScheduleTemplate, TripInstance};
use crate::repository::{EngineStore, ScheduleDirectory, TripRepository};
use crate::retry::{retry_transient, RetryPolicy};

/// Turns weekly schedule templates into dated trip instances on demand.
pub struct TripMaterializer {
    store: Arc<dyn EngineStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl TripMaterializer {
    pub fn new(store: Arc<dyn EngineStore>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self { store, clock, retry }
    }

    /// Idempotent get-or-create keyed by (bus, service date, departure).
    ///
    /// Concurrent callers racing on the same key all receive the row that
    /// won the insert.
    pub async fn get_or_create_trip(
        &self,
        template_id: Uuid,
        service_date: NaiveDate,
    ) -> EngineResult<TripInstance> {
        let template = self
            .store
            .get_template(template_id)
            .await?
            .ok_or(EngineError::TemplateNotFound(template_id))?;
        check_template(&template, service_date)?;

        let template = &template;
        retry_transient(&self.retry, "get_or_create_trip", move || {
            self.materialize(template, service_date)
        })
        .await
    }

    async fn materialize(
        &self,
        template: &ScheduleTemplate,
        service_date: NaiveDate,
    ) -> EngineResult<TripInstance> {
        if let Some(trip) = self.store.find_trip(&template.trip_key(service_date)).await? {
            debug!(trip_id = %trip.id, "Trip already materialized");
            return Ok(trip);
        }

        let bus = self
            .store
            .get_bus(template.bus_id)
            .await?
            .ok_or(EngineError::BusNotFound(template.bus_id))?;

        let draft = TripInstance::materialize(template, &bus, service_date, self.clock.now());
        let trip = self.store.insert_trip_if_absent(&draft).await?;
        if trip.id == draft.id {
            info!(
                trip_id = %trip.id,
                template_id = %template.id,
                bus_id = %trip.bus_id,
                service_date = %service_date,
                seats = trip.total_seats,
                "Trip materialized"
            );
        }
        Ok(trip)
    }
}

/// Rejects inactive templates and dates on the wrong weekday.
pub fn check_template(template: &ScheduleTemplate, service_date: NaiveDate) -> EngineResult<()> {
    if !template.active {
        return Err(EngineError::TemplateInactive(template.id));
    }
    if !template.runs_on(service_date) {
        return Err(EngineError::DateMismatch {
            date: service_date,
            expected: template.day_of_week,
            actual: service_date.weekday(),
        });
    }
    Ok(())
}
