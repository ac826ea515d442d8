use async_trait::async_trait;
use chrono::{DateTime, Utc};
use omniport_core::models::{TripInstance, TripKey, TripStatus};
use omniport_core::repository::TripRepository;
use omniport_core::{StoreError, StoreResult};
use uuid::Uuid;

use crate::database::PgStore;
use crate::rows::{db_error, TripRow, TRIP_COLUMNS};

#[async_trait]
impl TripRepository for PgStore {
    async fn get_trip(&self, trip_id: Uuid) -> StoreResult<Option<TripInstance>> {
        let sql = format!("SELECT {TRIP_COLUMNS} FROM trip_instances WHERE id = $1");
        let row = sqlx::query_as::<_, TripRow>(&sql)
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(TripInstance::try_from).transpose()
    }

    async fn find_trip(&self, key: &TripKey) -> StoreResult<Option<TripInstance>> {
        let sql = format!(
            "SELECT {TRIP_COLUMNS} FROM trip_instances \
             WHERE bus_id = $1 AND service_date = $2 AND departure_time = $3"
        );
        let row = sqlx::query_as::<_, TripRow>(&sql)
            .bind(key.bus_id)
            .bind(key.service_date)
            .bind(key.departure_time)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(TripInstance::try_from).transpose()
    }

    /// `ON CONFLICT DO NOTHING` on the natural key: the losing racer gets no
    /// row back and re-reads the winner.
    async fn insert_trip_if_absent(&self, draft: &TripInstance) -> StoreResult<TripInstance> {
        let sql = format!(
            "INSERT INTO trip_instances ({TRIP_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (bus_id, service_date, departure_time) DO NOTHING \
             RETURNING {TRIP_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, TripRow>(&sql)
            .bind(draft.id)
            .bind(draft.template_id)
            .bind(draft.bus_id)
            .bind(draft.driver_id)
            .bind(draft.service_date)
            .bind(draft.departure_time)
            .bind(draft.arrival_time)
            .bind(draft.price_per_seat)
            .bind(draft.total_seats)
            .bind(draft.seats_available)
            .bind(draft.status.as_str())
            .bind(draft.inconsistent)
            .bind(draft.created_at)
            .bind(draft.updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        match inserted {
            Some(row) => TripInstance::try_from(row),
            None => self.find_trip(&draft.key()).await?.ok_or_else(|| {
                StoreError::Unexpected(format!("trip key conflict without a row for {}", draft.id))
            }),
        }
    }

    async fn set_status_if(
        &self,
        trip_id: Uuid,
        from: &[TripStatus],
        to: TripStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<TripInstance>> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let sql = format!(
            "UPDATE trip_instances SET status = $2, updated_at = $3 \
             WHERE id = $1 AND status = ANY($4) \
             RETURNING {TRIP_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TripRow>(&sql)
            .bind(trip_id)
            .bind(to.as_str())
            .bind(at)
            .bind(&from)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(TripInstance::try_from).transpose()
    }
}
