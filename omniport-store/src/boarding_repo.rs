use async_trait::async_trait;
use omniport_core::models::{
    BookingStatus, DateWindow, PinScope, TicketContext, Ticket, TripStatus, VerificationRecord,
    VerifyOutcome,
};
use omniport_core::repository::{BookingStore, TripRepository, VerificationStore};
use omniport_core::{StoreError, StoreResult};
use uuid::Uuid;

use crate::database::PgStore;
use crate::rows::{
    convert_all, db_error, qualified, TicketRow, VerificationRow, TICKET_COLUMNS,
    VERIFICATION_COLUMNS,
};

#[async_trait]
impl VerificationStore for PgStore {
    async fn find_pin_candidates(&self, scope: &PinScope) -> StoreResult<Vec<TicketContext>> {
        let (date_op, date) = match scope.window {
            DateWindow::On(day) => ("=", day),
            DateWindow::From(day) => (">=", day),
        };
        // A verifier that is not a driver id matches unassigned trips only.
        let served_by: Option<Uuid> = scope
            .served_by
            .as_deref()
            .and_then(|who| Uuid::parse_str(who.trim()).ok());
        let sql = format!(
            "SELECT {} FROM tickets t \
             JOIN bookings b ON b.id = t.booking_id \
             JOIN trip_instances tr ON tr.id = t.trip_id \
             WHERE t.tracking_pin = $1 \
               AND b.status <> $2 \
               AND tr.status <> $3 \
               AND tr.service_date {date_op} $4 \
               AND ($5::uuid IS NULL OR t.trip_id = $5) \
               AND (NOT $6 OR tr.driver_id IS NULL OR tr.driver_id = $7) \
             ORDER BY tr.service_date, tr.departure_time",
            qualified("t", TICKET_COLUMNS)
        );
        let rows = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(&scope.pin)
            .bind(BookingStatus::Cancelled.as_str())
            .bind(TripStatus::Cancelled.as_str())
            .bind(date)
            .bind(scope.trip_id)
            .bind(scope.served_by.is_some())
            .bind(served_by)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for ticket in rows.into_iter().map(Ticket::from) {
            let booking = self.get_booking(ticket.booking_id).await?.ok_or_else(|| {
                StoreError::Unexpected(format!("ticket {} lost its booking", ticket.id))
            })?;
            let trip = self.get_trip(ticket.trip_id).await?.ok_or_else(|| {
                StoreError::Unexpected(format!("ticket {} lost its trip", ticket.id))
            })?;
            candidates.push(TicketContext { ticket, booking, trip });
        }
        Ok(candidates)
    }

    /// First writer per (ticket, service_date) wins; everyone else gets the
    /// stored record back. The first record also opens boarding on the trip,
    /// in the same transaction.
    async fn record_verification(&self, record: &VerificationRecord) -> StoreResult<VerifyOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let sql = format!(
            "INSERT INTO ticket_verifications ({VERIFICATION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (ticket_id, service_date) DO NOTHING \
             RETURNING {VERIFICATION_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, VerificationRow>(&sql)
            .bind(record.id)
            .bind(record.ticket_id)
            .bind(record.trip_id)
            .bind(record.service_date)
            .bind(&record.verified_by)
            .bind(record.verified_at)
            .bind(record.method.as_str())
            .bind(record.geo.map(|g| g.latitude))
            .bind(record.geo.map(|g| g.longitude))
            .bind(&record.notes)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;

        let Some(row) = inserted else {
            let sql = format!(
                "SELECT {VERIFICATION_COLUMNS} FROM ticket_verifications \
                 WHERE ticket_id = $1 AND service_date = $2"
            );
            let prior = sqlx::query_as::<_, VerificationRow>(&sql)
                .bind(record.ticket_id)
                .bind(record.service_date)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_error)?;
            tx.rollback().await.map_err(db_error)?;
            return Ok(VerifyOutcome::AlreadyVerified(VerificationRecord::try_from(prior)?));
        };

        sqlx::query(
            "UPDATE trip_instances SET status = $2, updated_at = $3 \
             WHERE id = $1 AND status = $4",
        )
        .bind(record.trip_id)
        .bind(TripStatus::Boarding.as_str())
        .bind(record.verified_at)
        .bind(TripStatus::Scheduled.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(VerifyOutcome::Recorded(VerificationRecord::try_from(row)?))
    }

    async fn list_trip_verifications(&self, trip_id: Uuid) -> StoreResult<Vec<VerificationRecord>> {
        let sql = format!(
            "SELECT {VERIFICATION_COLUMNS} FROM ticket_verifications \
             WHERE trip_id = $1 ORDER BY verified_at"
        );
        let rows = sqlx::query_as::<_, VerificationRow>(&sql)
            .bind(trip_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        convert_all(rows)
    }
}
