use axum::{extract::State, routing::post, Extension, Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use omniport_core::boarding::VerifyRequest;
use omniport_core::models::{GeoPoint, PassengerSummary, VerificationMethod};
use omniport_shared::models::events::{BoardingVerifiedEvent, TOPIC_BOARDING_VERIFIED};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::metrics::outcome;
use crate::middleware::{Claims, Role};
use crate::notify;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VerifyBoardingRequest {
    pub pin: String,
    pub trip_id: Option<Uuid>,
    #[serde(default)]
    pub method: VerificationMethod,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyBoardingResponse {
    pub verification_id: Uuid,
    pub service_date: NaiveDate,
    pub verified_at: DateTime<Utc>,
    pub method: VerificationMethod,
    pub passenger: PassengerSummary,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/boarding/verify", post(verify_boarding))
}

/// Both coordinates or neither.
pub(crate) fn geo_point(latitude: Option<f64>, longitude: Option<f64>) -> Result<Option<GeoPoint>, AppError> {
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Ok(Some(GeoPoint { latitude, longitude })),
        (None, None) => Ok(None),
        _ => Err(AppError::ValidationError(
            "latitude and longitude must be given together".to_string(),
        )),
    }
}

/// POST /v1/boarding/verify
async fn verify_boarding(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<VerifyBoardingRequest>,
) -> Result<Json<VerifyBoardingResponse>, AppError> {
    claims.require(&[Role::Driver])?;
    let geo = geo_point(req.latitude, req.longitude)?;

    let result = state
        .portal
        .verify_boarding(VerifyRequest {
            pin: req.pin,
            verifier_id: claims.sub.clone(),
            trip_id: req.trip_id,
            method: req.method,
            geo,
            notes: req.notes,
        })
        .await;
    state.metrics.verifications.with_label_values(&[outcome(&result)]).inc();
    let confirmation = result?;

    let record = confirmation.record;
    notify::publish(
        &state,
        TOPIC_BOARDING_VERIFIED,
        record.trip_id.to_string(),
        BoardingVerifiedEvent {
            verification_id: record.id,
            ticket_id: record.ticket_id,
            trip_id: record.trip_id,
            verified_by: record.verified_by.clone(),
            verified_at: record.verified_at,
        },
    );

    Ok(Json(VerifyBoardingResponse {
        verification_id: record.id,
        service_date: record.service_date,
        verified_at: record.verified_at,
        method: record.method,
        passenger: confirmation.passenger,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_needs_both_coordinates() {
        assert!(geo_point(None, None).unwrap().is_none());
        assert_eq!(
            geo_point(Some(6.93), Some(79.85)).unwrap(),
            Some(GeoPoint { latitude: 6.93, longitude: 79.85 })
        );
        assert!(geo_point(Some(6.93), None).is_err());
    }
}
