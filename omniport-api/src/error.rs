use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use omniport_core::{EngineError, ErrorClass};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    AuthorizationError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error("{0}")]
    ConflictError(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    InternalServerError(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::TemplateNotFound(_)
            | EngineError::BusNotFound(_)
            | EngineError::TripNotFound(_)
            | EngineError::BookingNotFound(_)
            | EngineError::PinNotFound => AppError::NotFoundError(err.to_string()),
            EngineError::NotAssignedDriver { .. } => AppError::AuthorizationError(err.to_string()),
            EngineError::TripNotBookable { .. }
            | EngineError::TripNotCancellable { .. }
            | EngineError::BookingNotCancellable(_)
            | EngineError::AmbiguousPin { .. } => AppError::ConflictError(err.to_string()),
            EngineError::SeatsUnavailable { .. } => {
                AppError::ConflictError("Seats unavailable".to_string())
            }
            EngineError::AlreadyVerified { local_time, .. } => {
                AppError::ConflictError(format!("PIN already used at {}", local_time))
            }
            _ => match err.class() {
                ErrorClass::Validation => AppError::ValidationError(err.to_string()),
                ErrorClass::Transient => {
                    tracing::warn!("Request gave up on transient failure: {}", err);
                    AppError::ServiceUnavailable("Temporarily unavailable, try again".to_string())
                }
                _ => AppError::InternalServerError(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use omniport_core::StoreError;
    use uuid::Uuid;

    fn status_of(err: EngineError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_engine_errors_map_to_status() {
        assert_eq!(status_of(EngineError::TripNotFound(Uuid::new_v4())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(EngineError::InvalidRequest("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(EngineError::SeatsUnavailable { requested: 1, available: 0 }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EngineError::TryAgain { operation: "reserve_seat" }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(EngineError::NotAssignedDriver { trip_id: Uuid::new_v4() }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(EngineError::BookingNotCancellable(Uuid::new_v4())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EngineError::Store(StoreError::Unexpected("connection refused".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_already_verified_shows_local_time() {
        let err = AppError::from(EngineError::AlreadyVerified {
            ticket_number: "TKT-20261019-ABC123".into(),
            verified_at: Utc::now(),
            local_time: "08:14".into(),
        });
        assert_eq!(err.to_string(), "PIN already used at 08:14");
    }
}
