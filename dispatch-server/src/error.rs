use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dispatch_core::CoreError;
use serde_json::json;

/// The only place a `CoreError` variant becomes an HTTP status. Library
/// crates never make this decision themselves.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            CoreError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            CoreError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            CoreError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            CoreError::Auth(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            CoreError::Transient(err) => {
                tracing::error!(error = %err, "database error");
                (StatusCode::SERVICE_UNAVAILABLE, "transient database error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
