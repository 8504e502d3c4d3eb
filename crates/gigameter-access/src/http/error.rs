//! HTTP mapping for access errors.
//!
//! Denials are reported as `403` with a JSON body:
//!
//! ```json
//! { "statusCode": 403, "error": "Forbidden", "code": "category-not-found", "message": "Category 'x' not found" }
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AccessError;

// =============================================================================
// IntoResponse Implementation
// =============================================================================

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let (status, message) = error_details(&self);

        if status.is_server_error() {
            tracing::error!(error = %self, "Access check failed");
        }

        let body = json!({
            "statusCode": status.as_u16(),
            "error": status.canonical_reason().unwrap_or("Error"),
            "code": self.error_code(),
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}

/// Extracts the HTTP status and client-facing message.
fn error_details(error: &AccessError) -> (StatusCode, String) {
    match error {
        AccessError::PolicyNotFound { .. } => (StatusCode::FORBIDDEN, error.to_string()),
        AccessError::AccessDenied { message, .. } => (StatusCode::FORBIDDEN, message.clone()),
        AccessError::Store { .. } | AccessError::Internal { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        ),
    }
}
