use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Errors reported at the ingestion boundary or for structural misuse.
///
/// Data anomalies inside an established stream (out-of-order timestamps,
/// decreasing volume) are normalized by the engine and never surface here.
#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("cumulative volume must be finite and non-negative, got {0}")]
    InvalidVolume(f64),

    #[error("timestamp {0} ms is outside the representable range")]
    InvalidTimestamp(i64),

    #[error("no active monitoring session for patient {0}")]
    NoSession(String),

    #[error("monitoring session for patient {0} is paused")]
    SessionPaused(String),
}

/// HTTP-facing error wrapper for the API layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("simulation mode is disabled")]
    SimulationDisabled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Ingest(IngestError::NoSession(_)) => StatusCode::NOT_FOUND,
            ApiError::Ingest(IngestError::SessionPaused(_)) => StatusCode::CONFLICT,
            ApiError::Ingest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ApiError::SimulationDisabled => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "status": "error",
            "detail": self.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_taxonomy() {
        let paused = ApiError::Ingest(IngestError::SessionPaused("p-1".into()));
        assert_eq!(paused.status_code(), StatusCode::CONFLICT);

        let missing = ApiError::Ingest(IngestError::NoSession("p-1".into()));
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let malformed = ApiError::Ingest(IngestError::InvalidVolume(f64::NAN));
        assert_eq!(malformed.status_code(), StatusCode::BAD_REQUEST);

        assert_eq!(ApiError::SimulationDisabled.status_code(), StatusCode::FORBIDDEN);
    }
}
