use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gigameter_access::AccessError;
use serde_json::json;

/// Errors returned by server handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Access(err) => err.into_response(),
            Self::NotFound(message) => {
                let status = StatusCode::NOT_FOUND;
                let body = json!({
                    "statusCode": status.as_u16(),
                    "error": status.canonical_reason().unwrap_or("Not Found"),
                    "code": "not-found",
                    "message": message,
                });
                (status, Json(body)).into_response()
            }
        }
    }
}
