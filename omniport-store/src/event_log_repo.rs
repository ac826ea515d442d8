use async_trait::async_trait;
use omniport_core::models::{
    AppendOutcome, BookingStatus, NewTripEvent, TripInstance, TripStatus, TripStatusEvent,
};
use omniport_core::repository::TripEventStore;
use omniport_core::{StoreError, StoreResult};
use uuid::Uuid;

use crate::database::PgStore;
use crate::rows::{convert_all, db_error, EventRow, TripRow, EVENT_COLUMNS, TRIP_COLUMNS};

#[async_trait]
impl TripEventStore for PgStore {
    /// The trip row is locked for the duration so concurrent events for the
    /// same trip apply their transitions one after another. Completion closes
    /// the trip's confirmed bookings in the same transaction.
    async fn append_event(&self, event: &NewTripEvent) -> StoreResult<AppendOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let sql = format!("SELECT {TRIP_COLUMNS} FROM trip_instances WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, TripRow>(&sql)
            .bind(event.trip_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?
            .ok_or_else(|| StoreError::NotFound(format!("trip {}", event.trip_id)))?;
        let mut trip = TripInstance::try_from(row)?;

        let transition = trip.status.apply(event.event_type);
        if transition.changed() || transition.inconsistent {
            let sql = format!(
                "UPDATE trip_instances \
                 SET status = $2, inconsistent = inconsistent OR $3, updated_at = $4 \
                 WHERE id = $1 \
                 RETURNING {TRIP_COLUMNS}"
            );
            let row = sqlx::query_as::<_, TripRow>(&sql)
                .bind(trip.id)
                .bind(transition.next.as_str())
                .bind(transition.inconsistent)
                .bind(event.recorded_at)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_error)?;
            trip = TripInstance::try_from(row)?;
        }

        if transition.changed() && transition.next == TripStatus::Completed {
            sqlx::query(
                "UPDATE bookings SET status = $2, updated_at = $3 \
                 WHERE trip_id = $1 AND status = $4",
            )
            .bind(trip.id)
            .bind(BookingStatus::Completed.as_str())
            .bind(event.recorded_at)
            .bind(BookingStatus::Confirmed.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        let sql = format!(
            "INSERT INTO trip_status_events \
             (id, trip_id, emitted_by, event_type, occurred_at, recorded_at, message, latitude, longitude) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {EVENT_COLUMNS}"
        );
        let stored = sqlx::query_as::<_, EventRow>(&sql)
            .bind(event.id)
            .bind(event.trip_id)
            .bind(&event.emitted_by)
            .bind(event.event_type.as_str())
            .bind(event.occurred_at)
            .bind(event.recorded_at)
            .bind(&event.message)
            .bind(event.geo.map(|g| g.latitude))
            .bind(event.geo.map(|g| g.longitude))
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(AppendOutcome {
            event: TripStatusEvent::try_from(stored)?,
            trip,
            transition,
        })
    }

    async fn list_events(&self, trip_id: Uuid) -> StoreResult<Vec<TripStatusEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM trip_status_events \
             WHERE trip_id = $1 ORDER BY occurred_at, seq"
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(trip_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        convert_all(rows)
    }
}
