//! Service and HTTP error types.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    services::{dice::TurnOrderError, players::PlayerRegistryError},
    state::phase::InvalidTransition,
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Acting user is not allowed to perform the action.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// A stored record could not be decoded.
    #[error("corrupt data: {0}")]
    Corrupt(String),
    /// Optimistic update kept losing against concurrent writers.
    #[error("too many concurrent updates: {0}")]
    TooManyConflicts(String),
}

impl ServiceError {
    /// Whether the error is a rejected action the acting player should hear about.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ServiceError::Unauthorized(_)
                | ServiceError::InvalidInput(_)
                | ServiceError::InvalidState(_)
        )
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Corrupt { key, .. } => ServiceError::Corrupt(key),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<PlayerRegistryError> for ServiceError {
    fn from(err: PlayerRegistryError) -> Self {
        match err {
            PlayerRegistryError::NotFound { username, .. } => {
                ServiceError::NotFound(format!("player `{username}` not found"))
            }
            PlayerRegistryError::Corrupt { key, .. } => ServiceError::Corrupt(key),
            PlayerRegistryError::TooManyConflicts { username, .. } => {
                ServiceError::TooManyConflicts(username)
            }
            PlayerRegistryError::Storage(source) => source.into(),
        }
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<TurnOrderError> for ServiceError {
    fn from(err: TurnOrderError) -> Self {
        ServiceError::Corrupt(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Corrupt(key) => AppError::Internal(format!("corrupt record `{key}`")),
            ServiceError::TooManyConflicts(message) => AppError::Conflict(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_map_to_service_errors() {
        let err: ServiceError = PlayerRegistryError::TooManyConflicts {
            username: "bob".into(),
            attempts: 3,
        }
        .into();
        assert!(matches!(err, ServiceError::TooManyConflicts(_)));
        assert!(!err.is_validation());

        let err: ServiceError = StorageError::corrupt("game:1:player:bob", std::fmt::Error).into();
        assert!(matches!(err, ServiceError::Corrupt(ref key) if key == "game:1:player:bob"));
    }

    #[test]
    fn validation_family_maps_to_client_statuses() {
        let cases = [
            (ServiceError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::InvalidState("x".into()), StatusCode::CONFLICT),
            (ServiceError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ServiceError::Degraded, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert!(err.is_validation() || status == StatusCode::SERVICE_UNAVAILABLE);
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }
}
