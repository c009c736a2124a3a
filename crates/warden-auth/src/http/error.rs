//! Error responses for the administrative endpoints.
//!
//! The warden decision endpoints never use this mapping; they answer
//! `{"allowed": false}` on every failure.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

// =============================================================================
// IntoResponse Implementation
// =============================================================================

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let reason = status.canonical_reason().unwrap_or("Error");

        let message = if status.is_server_error() {
            tracing::error!(error = %self, kind = %self.kind(), "Request failed");
            "The server could not complete the request".to_string()
        } else {
            tracing::debug!(error = %self, kind = %self.kind(), "Request rejected");
            self.to_string()
        };

        let body = json!({
            "error": {
                "code": status.as_u16(),
                "status": reason,
                "message": message,
            }
        });

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer error=\"invalid_token\""),
            );
        }
        response
    }
}

/// HTTP status for an error.
#[must_use]
pub fn status_for(error: &AuthError) -> StatusCode {
    match error {
        AuthError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
        AuthError::NotFound { .. } => StatusCode::NOT_FOUND,
        AuthError::Duplicate { .. } => StatusCode::CONFLICT,
        AuthError::InvalidToken { .. } | AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
        AuthError::Forbidden { .. } | AuthError::MissingScope { .. } => StatusCode::FORBIDDEN,
        AuthError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::StoreUnavailable { .. }
        | AuthError::Decode { .. }
        | AuthError::Configuration { .. }
        | AuthError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
