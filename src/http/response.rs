//! JSON responses and error mapping.
//!
//! # Design Decisions
//! - Every error body is `{"error": "<message>"}`
//! - Disabled resources map to 503 so callers can tell "not configured"
//!   from a server fault; operation timeouts map to 504

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::resource::ResourceError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Render `value` as a JSON response with `status`.
pub fn json<T: Serialize>(status: StatusCode, value: T) -> Response {
    (status, Json(value)).into_response()
}

/// Render `{"error": message}` with `status`.
pub fn error(status: StatusCode, message: impl Into<String>) -> Response {
    json(
        status,
        ErrorBody {
            error: message.into(),
        },
    )
}

/// Handler error wrapping a resource failure.
#[derive(Debug)]
pub struct ApiError(pub ResourceError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ResourceError::Disabled(_) => StatusCode::SERVICE_UNAVAILABLE,
            ResourceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ResourceError> for ApiError {
    fn from(err: ResourceError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && !self.0.is_disabled() {
            tracing::error!(error = %self.0, status = status.as_u16(), "Request failed");
        }
        error(status, self.0.to_string())
    }
}
