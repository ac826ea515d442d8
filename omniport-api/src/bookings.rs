use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use omniport_core::models::{Booking, BookingStatus, PassengerDetails, Ticket};
use omniport_core::portal::BookSeatRequest;
use omniport_shared::models::events::{
    BookingCancelledEvent, BookingConfirmedEvent, TOPIC_BOOKING_CANCELLED, TOPIC_BOOKING_CONFIRMED,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::metrics::outcome;
use crate::middleware::{Claims, Role};
use crate::notify;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub template_id: Uuid,
    pub service_date: NaiveDate,
    pub passenger: PassengerDetails,
    #[serde(default = "one_seat")]
    pub seat_count: i32,
}

fn one_seat() -> i32 {
    1
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub booking_id: Uuid,
    pub reference: String,
    pub status: BookingStatus,
    pub trip_id: Uuid,
    pub ticket_number: String,
    pub tracking_pin: String,
    pub seat_count: i32,
    pub total_amount: i32,
    pub passenger_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<(Booking, Ticket)> for BookingResponse {
    fn from((booking, ticket): (Booking, Ticket)) -> Self {
        Self {
            booking_id: booking.id,
            reference: booking.reference,
            status: booking.status,
            trip_id: booking.trip_id,
            ticket_number: ticket.ticket_number,
            tracking_pin: ticket.tracking_pin,
            seat_count: booking.seat_count,
            total_amount: booking.total_amount,
            passenger_name: booking.passenger.name,
            created_at: booking.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateBookingResponse {
    #[serde(flatten)]
    pub booking: BookingResponse,
    pub service_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub seats_available: i32,
}

#[derive(Debug, Serialize)]
pub struct CancelBookingResponse {
    pub booking_id: Uuid,
    pub status: BookingStatus,
    pub already_cancelled: bool,
    pub seats_available: Option<i32>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking).get(list_bookings))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/bookings
async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<CreateBookingResponse>), AppError> {
    claims.require(&[Role::Passenger])?;

    let result = state
        .portal
        .book_seat(BookSeatRequest {
            template_id: req.template_id,
            service_date: req.service_date,
            passenger_ref: claims.sub.clone(),
            passenger: req.passenger,
            seat_count: req.seat_count,
        })
        .await;
    state.metrics.bookings.with_label_values(&[outcome(&result)]).inc();
    let confirmation = result?;

    let receipt = confirmation.receipt;
    info!(booking_id = %receipt.booking.id, trip_id = %confirmation.trip.id, "Booking confirmed");
    notify::publish(
        &state,
        TOPIC_BOOKING_CONFIRMED,
        confirmation.trip.id.to_string(),
        BookingConfirmedEvent {
            booking_id: receipt.booking.id,
            trip_id: confirmation.trip.id,
            passenger_ref: receipt.booking.passenger_ref.clone(),
            booking_reference: receipt.booking.reference.clone(),
            ticket_number: receipt.ticket.ticket_number.clone(),
            service_date: confirmation.trip.service_date,
            seats_available: receipt.seats_available,
            timestamp: receipt.booking.created_at.timestamp(),
        },
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateBookingResponse {
            booking: BookingResponse::from((receipt.booking, receipt.ticket)),
            service_date: confirmation.trip.service_date,
            departure_time: confirmation.trip.departure_time,
            seats_available: receipt.seats_available,
        }),
    ))
}

/// GET /v1/bookings
/// The caller's bookings, newest first.
async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    claims.require(&[Role::Passenger])?;
    let bookings = state.portal.list_bookings(&claims.sub).await?;
    Ok(Json(bookings.into_iter().map(BookingResponse::from).collect()))
}

/// GET /v1/bookings/{id}
async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let found = state.portal.get_booking(booking_id, claims.owner_scope()).await?;
    Ok(Json(BookingResponse::from(found)))
}

/// POST /v1/bookings/{id}/cancel
async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<CancelBookingResponse>, AppError> {
    claims.require(&[Role::Passenger, Role::Operator])?;

    let cancellation = state
        .portal
        .cancel_booking(booking_id, claims.owner_scope())
        .await?;

    if let Some(seats_available) = cancellation.seats_available {
        notify::publish(
            &state,
            TOPIC_BOOKING_CANCELLED,
            cancellation.booking.trip_id.to_string(),
            BookingCancelledEvent {
                booking_id,
                trip_id: cancellation.booking.trip_id,
                booking_reference: cancellation.booking.reference.clone(),
                seats_available,
                timestamp: cancellation.booking.updated_at.timestamp(),
            },
        );
    }

    Ok(Json(CancelBookingResponse {
        booking_id,
        status: cancellation.booking.status,
        already_cancelled: cancellation.already_cancelled,
        seats_available: cancellation.seats_available,
    }))
}
