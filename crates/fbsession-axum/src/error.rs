//! Rejection type for session extractors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fbsession_core::AuthError;
use serde_json::json;

/// A failed session resolution, rendered as a JSON error response.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct SessionRejection(#[from] pub AuthError);

impl SessionRejection {
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for SessionRejection {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(
                error = %self.0,
                error_code = self.0.error_code(),
                "session resolution failed"
            );
            "session service unavailable".to_string()
        } else {
            self.0.to_string()
        };

        let body = Json(json!({
            "error": self.0.error_code(),
            "message": message,
        }));
        (status, body).into_response()
    }
}
