use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use futures_util::stream::Stream;
use omniport_core::models::{TripEventType, TripInstance, TripStatus, TripStatusEvent};
use omniport_core::portal::TripManifest;
use omniport_core::status_log::{ReportEvent, TripStatusView};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::boarding::geo_point;
use crate::error::AppError;
use crate::middleware::{Claims, Role};
use crate::notify;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReportEventRequest {
    pub event_type: TripEventType,
    pub message: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ReportEventResponse {
    pub event: TripStatusEvent,
    pub trip_status: TripStatus,
    pub status_changed: bool,
    pub inconsistent: bool,
}

/// Routes anyone may call.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips/{id}/status", get(get_trip_status))
        .route("/v1/trips/{id}/stream", get(stream_trip_status))
}

/// Staff routes; expect [`Claims`] from the auth layer.
pub fn staff_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips/{id}/events", post(report_event))
        .route("/v1/trips/{id}/manifest", get(trip_manifest))
        .route("/v1/trips/{id}/cancel", post(cancel_trip))
}

/// POST /v1/trips/{id}/events
async fn report_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<ReportEventRequest>,
) -> Result<Json<ReportEventResponse>, AppError> {
    claims.require(&[Role::Driver])?;
    let geo = geo_point(req.latitude, req.longitude)?;

    let appended = state
        .portal
        .report_trip_event(ReportEvent {
            trip_id,
            emitted_by: claims.sub.clone(),
            event_type: req.event_type,
            message: req.message,
            occurred_at: req.occurred_at,
            geo,
        })
        .await?;

    state
        .metrics
        .trip_events
        .with_label_values(&[appended.event.event_type.as_str()])
        .inc();
    notify::trip_status(&state, &appended);

    Ok(Json(ReportEventResponse {
        trip_status: appended.trip.status,
        status_changed: appended.transition.changed(),
        inconsistent: appended.trip.inconsistent,
        event: appended.event,
    }))
}

/// GET /v1/trips/{id}/status
async fn get_trip_status(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<TripStatusView>, AppError> {
    Ok(Json(state.portal.get_trip_status(trip_id).await?))
}

/// GET /v1/trips/{id}/stream
/// Server-sent events for status updates appended after subscription.
async fn stream_trip_status(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // 404 for unknown trips instead of an idle stream.
    state.portal.get_trip_status(trip_id).await?;

    let rx = state.sse_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(notice) if notice.trip_id == trip_id => Event::default()
            .event("trip_status")
            .json_data(&notice)
            .ok()
            .map(Ok),
        // Lagged receivers skip ahead; clients re-read the status endpoint.
        _ => None,
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// GET /v1/trips/{id}/manifest
async fn trip_manifest(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<TripManifest>, AppError> {
    claims.require(&[Role::Driver, Role::Operator])?;
    Ok(Json(state.portal.trip_manifest(trip_id).await?))
}

/// POST /v1/trips/{id}/cancel
async fn cancel_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<TripInstance>, AppError> {
    claims.require(&[Role::Operator])?;
    Ok(Json(state.portal.cancel_trip(trip_id).await?))
}
