use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::{self, Display};

/// Errors produced by the alert engine and its collaborators.
///
/// `Validation` rejects are never partially applied; `Persistence` aborts the
/// in-flight transition; `Delivery` is local to one subscriber; `Configuration`
/// only occurs at startup.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    pub fn validation(err: impl Display) -> Self {
        Self::Validation(err.to_string())
    }

    pub fn persistence(err: impl Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for ApiError {}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::internal(value.to_string())
    }
}

impl From<EngineError> for ApiError {
    fn from(value: EngineError) -> Self {
        match &value {
            EngineError::Validation(_) => Self::bad_request(value.to_string()),
            EngineError::Persistence(_) => Self::unavailable(value.to_string()),
            EngineError::Delivery(_) => Self::internal(value.to_string()),
            EngineError::Configuration(_) => Self::internal(value.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_carry_their_kind() {
        let err = EngineError::Validation("message cannot be empty".into());
        assert_eq!(err.to_string(), "validation error: message cannot be empty");
    }

    #[test]
    fn validation_maps_to_bad_request() {
        let api: ApiError = EngineError::Validation("bad".into()).into();
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn persistence_maps_to_service_unavailable() {
        let api: ApiError = EngineError::Persistence("db down".into()).into();
        assert_eq!(api.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
