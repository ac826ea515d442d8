use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use omniport_core::search::{TripSearchRequest, TripSearchResult};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/trips/search", get(search_trips))
}

/// GET /v1/trips/search?from=..&to=..&date=YYYY-MM-DD
async fn search_trips(
    State(state): State<AppState>,
    Query(req): Query<TripSearchRequest>,
) -> Result<Json<Vec<TripSearchResult>>, AppError> {
    let results = state.portal.search_trips(&req).await?;
    Ok(Json(results))
}
