//! HTTP error mapping for the web layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::RepositoryError;

/// Body used for every non-success response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// Unknown resource; the message names what was looked up
    NotFound(&'static str),
    BadRequest(String),
    Conflict(String),
    Internal,
}

impl ApiError {
    /// Map a store failure, logging it with the operation that failed
    pub fn from_repository(operation: &str, error: RepositoryError) -> Self {
        match error {
            RepositoryError::UniqueViolation { .. } => Self::Conflict(error.to_string()),
            RepositoryError::ConstraintViolation { .. } => Self::BadRequest(error.to_string()),
            other => {
                error!("Failed to {}: {}", operation, other);
                Self::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message.to_string()),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Conflict(message) => (StatusCode::CONFLICT, message),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        };

        (status, Json(MessageResponse { message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_statuses() {
        let conflict =
            ApiError::from_repository("create team", RepositoryError::unique_violation("teams", "dup"));
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);

        let bad = ApiError::from_repository(
            "create component",
            RepositoryError::constraint_violation("components_team_fkey", "missing team"),
        );
        assert_eq!(bad.into_response().status(), StatusCode::BAD_REQUEST);

        let internal = ApiError::from_repository(
            "list teams",
            RepositoryError::ConnectionFailed {
                message: "refused".to_string(),
            },
        );
        assert_eq!(
            internal.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
