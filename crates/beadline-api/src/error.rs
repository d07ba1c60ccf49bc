//! API error type and its HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use beadline_core::CoreError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Request could not be interpreted.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(CoreError::BeadNotFound(_) | CoreError::UnknownLane(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Core(CoreError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            ApiError::Core(CoreError::MissingCredential { .. }) => StatusCode::FAILED_DEPENDENCY,
            ApiError::Core(CoreError::InvalidBudget { .. } | CoreError::InvalidInput(_))
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Core(CoreError::BeadNotFound(_)) => "BEAD_NOT_FOUND",
            ApiError::Core(CoreError::UnknownLane(_)) => "UNKNOWN_LANE",
            ApiError::Core(CoreError::InvalidTransition { .. }) => "INVALID_TRANSITION",
            ApiError::Core(CoreError::MissingCredential { .. }) => "MISSING_CREDENTIAL",
            ApiError::Core(CoreError::InvalidBudget { .. }) => "INVALID_BUDGET",
            ApiError::Core(CoreError::InvalidInput(_)) | ApiError::BadRequest(_) => "BAD_REQUEST",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let hint = match &self {
            ApiError::Core(CoreError::MissingCredential { hint, .. }) => Some(hint.clone()),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
            hint,
        };
        (self.status(), Json(body)).into_response()
    }
}
