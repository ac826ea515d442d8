use async_trait::async_trait;
use omniport_core::models::{BusProfile, BusStatus, ScheduleTemplate};
use omniport_core::repository::ScheduleDirectory;
use omniport_core::StoreResult;
use uuid::Uuid;

use crate::database::PgStore;
use crate::rows::{convert_all, db_error, BusRow, TemplateRow, BUS_COLUMNS, TEMPLATE_COLUMNS};

#[async_trait]
impl ScheduleDirectory for PgStore {
    async fn get_bus(&self, bus_id: Uuid) -> StoreResult<Option<BusProfile>> {
        let sql = format!("SELECT {BUS_COLUMNS} FROM buses WHERE id = $1");
        let row = sqlx::query_as::<_, BusRow>(&sql)
            .bind(bus_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(BusProfile::try_from).transpose()
    }

    async fn get_template(&self, template_id: Uuid) -> StoreResult<Option<ScheduleTemplate>> {
        let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM schedule_templates WHERE id = $1");
        let row = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(template_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.map(ScheduleTemplate::from))
    }

    async fn list_active_templates(
        &self,
        bus_id: Uuid,
        day_of_week: u8,
    ) -> StoreResult<Vec<ScheduleTemplate>> {
        let sql = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM schedule_templates \
             WHERE bus_id = $1 AND day_of_week = $2 AND active \
             ORDER BY departure_time"
        );
        let rows = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(bus_id)
            .bind(i16::from(day_of_week))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(ScheduleTemplate::from).collect())
    }

    async fn list_buses_on_route(
        &self,
        from_city: &str,
        to_city: &str,
    ) -> StoreResult<Vec<BusProfile>> {
        let sql = format!(
            "SELECT {BUS_COLUMNS} FROM buses \
             WHERE lower(from_city) = lower($1) AND lower(to_city) = lower($2) AND status = $3 \
             ORDER BY name"
        );
        let rows = sqlx::query_as::<_, BusRow>(&sql)
            .bind(from_city)
            .bind(to_city)
            .bind(BusStatus::Active.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        convert_all(rows)
    }
}
