use async_trait::async_trait;
use chrono::{DateTime, Utc};
use omniport_core::models::{
    Booking, BookingStatus, CancelOutcome, Reservation, ReserveOutcome, Ticket, TripInstance,
    TripStatus,
};
use omniport_core::repository::BookingStore;
use omniport_core::{StoreError, StoreResult};
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::PgStore;
use crate::rows::{
    db_error, parse_label, BookingRow, TicketRow, TripRow, BOOKING_COLUMNS, TICKET_COLUMNS,
    TRIP_COLUMNS,
};

impl PgStore {
    async fn insert_booking(
        tx: &mut Transaction<'_, Postgres>,
        booking: &Booking,
    ) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        );
        sqlx::query(&sql)
            .bind(booking.id)
            .bind(booking.trip_id)
            .bind(&booking.passenger_ref)
            .bind(&booking.passenger.name)
            .bind(booking.passenger.email.expose())
            .bind(booking.passenger.phone.expose())
            .bind(booking.seat_count)
            .bind(booking.total_amount)
            .bind(booking.status.as_str())
            .bind(&booking.reference)
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn insert_ticket(tx: &mut Transaction<'_, Postgres>, ticket: &Ticket) -> StoreResult<()> {
        let sql = format!("INSERT INTO tickets ({TICKET_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)");
        sqlx::query(&sql)
            .bind(ticket.id)
            .bind(ticket.booking_id)
            .bind(ticket.trip_id)
            .bind(&ticket.ticket_number)
            .bind(&ticket.tracking_pin)
            .bind(ticket.issued_at)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn tickets_for(&self, bookings: Vec<BookingRow>) -> StoreResult<Vec<(Booking, Ticket)>> {
        let bookings = bookings
            .into_iter()
            .map(Booking::try_from)
            .collect::<StoreResult<Vec<_>>>()?;
        let ids: Vec<Uuid> = bookings.iter().map(|b| b.id).collect();

        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE booking_id = ANY($1)");
        let mut tickets: HashMap<Uuid, Ticket> = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?
            .into_iter()
            .map(Ticket::from)
            .map(|t| (t.booking_id, t))
            .collect();

        bookings
            .into_iter()
            .map(|booking| {
                let ticket = tickets.remove(&booking.id).ok_or_else(|| {
                    StoreError::Unexpected(format!("booking {} has no ticket", booking.id))
                })?;
                Ok((booking, ticket))
            })
            .collect()
    }
}

#[async_trait]
impl BookingStore for PgStore {
    /// One transaction: conditional decrement, then booking and ticket.
    /// A failed insert drops the transaction and with it the decrement.
    async fn reserve(&self, reservation: &Reservation) -> StoreResult<ReserveOutcome> {
        let booking = &reservation.booking;
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let decremented: Option<(i32,)> = sqlx::query_as(
            "UPDATE trip_instances \
             SET seats_available = seats_available - $2, updated_at = $3 \
             WHERE id = $1 AND seats_available >= $2 AND status = ANY($4) \
             RETURNING seats_available",
        )
        .bind(booking.trip_id)
        .bind(booking.seat_count)
        .bind(booking.created_at)
        .bind(vec![
            TripStatus::Scheduled.as_str().to_string(),
            TripStatus::Boarding.as_str().to_string(),
        ])
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;

        let Some((seats_available,)) = decremented else {
            // Nothing changed; report why.
            let current: Option<(String, i32)> =
                sqlx::query_as("SELECT status, seats_available FROM trip_instances WHERE id = $1")
                    .bind(booking.trip_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_error)?;
            tx.rollback().await.map_err(db_error)?;
            return Ok(match current {
                None => ReserveOutcome::TripMissing,
                Some((status, available)) => {
                    let status: TripStatus = parse_label(&status)?;
                    if status.is_bookable() {
                        ReserveOutcome::SeatsUnavailable { available }
                    } else {
                        ReserveOutcome::NotBookable(status)
                    }
                }
            });
        };

        Self::insert_booking(&mut tx, booking).await?;
        Self::insert_ticket(&mut tx, &reservation.ticket).await?;
        tx.commit().await.map_err(db_error)?;

        Ok(ReserveOutcome::Reserved {
            booking: booking.clone(),
            ticket: reservation.ticket.clone(),
            seats_available,
        })
    }

    /// Locks the trip before the booking, the same order `append_event`
    /// and `reserve` take them in.
    async fn cancel_booking(&self, booking_id: Uuid, at: DateTime<Utc>) -> StoreResult<CancelOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let Some((trip_id,)): Option<(Uuid,)> =
            sqlx::query_as("SELECT trip_id FROM bookings WHERE id = $1")
                .bind(booking_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?
        else {
            return Ok(CancelOutcome::Missing);
        };

        let sql = format!("SELECT {TRIP_COLUMNS} FROM trip_instances WHERE id = $1 FOR UPDATE");
        let trip = sqlx::query_as::<_, TripRow>(&sql)
            .bind(trip_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?
            .ok_or_else(|| {
                StoreError::Unexpected(format!("booking {} references a missing trip", booking_id))
            })?;
        let trip = TripInstance::try_from(trip)?;

        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE");
        let Some(row) = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(booking_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?
        else {
            return Ok(CancelOutcome::Missing);
        };
        let booking = Booking::try_from(row)?;
        match booking.status {
            BookingStatus::Cancelled => return Ok(CancelOutcome::AlreadyCancelled(booking)),
            BookingStatus::Completed => return Ok(CancelOutcome::NotCancellable(booking)),
            BookingStatus::Confirmed => {}
        }
        if !trip.allows_booking_cancellation() {
            return Ok(CancelOutcome::NotCancellable(booking));
        }

        let sql = format!(
            "UPDATE bookings SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {BOOKING_COLUMNS}"
        );
        let cancelled = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(booking_id)
            .bind(BookingStatus::Cancelled.as_str())
            .bind(at)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;

        let (seats_available,): (i32,) = sqlx::query_as(
            "UPDATE trip_instances \
             SET seats_available = LEAST(seats_available + $2, total_seats), updated_at = $3 \
             WHERE id = $1 \
             RETURNING seats_available",
        )
        .bind(booking.trip_id)
        .bind(booking.seat_count)
        .bind(at)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(CancelOutcome::Cancelled {
            booking: Booking::try_from(cancelled)?,
            seats_available,
        })
    }

    async fn get_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn get_ticket_by_booking(&self, booking_id: Uuid) -> StoreResult<Option<Ticket>> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE booking_id = $1");
        let row = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.map(Ticket::from))
    }

    async fn list_bookings_for_passenger(
        &self,
        passenger_ref: &str,
    ) -> StoreResult<Vec<(Booking, Ticket)>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE passenger_ref = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(passenger_ref)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        self.tickets_for(rows).await
    }

    async fn list_trip_bookings(&self, trip_id: Uuid) -> StoreResult<Vec<(Booking, Ticket)>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE trip_id = $1 ORDER BY created_at");
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(trip_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        self.tickets_for(rows).await
    }
}
