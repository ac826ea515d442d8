use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use omniport_core::portal::TrackedTicket;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/tickets/track/{pin}", get(track_ticket))
}

/// GET /v1/tickets/track/{pin}
/// Public tracking page: ticket, trip and its status timeline.
async fn track_ticket(
    State(state): State<AppState>,
    Path(pin): Path<String>,
) -> Result<Json<TrackedTicket>, AppError> {
    Ok(Json(state.portal.track_ticket(&pin).await?))
}
