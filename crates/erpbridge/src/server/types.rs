use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// An error returned by an endpoint, rendered as `{"error": ..., "details": ...}`.
#[derive(Debug, Clone)]
pub struct ApiErrorType {
    status_code: StatusCode,
    message: String,
    details: Option<String>,
}

impl ApiErrorType {
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }
}

impl From<(StatusCode, &str, Option<String>)> for ApiErrorType {
    fn from((status_code, message, details): (StatusCode, &str, Option<String>)) -> Self {
        Self {
            status_code,
            message: message.to_string(),
            details,
        }
    }
}

impl IntoResponse for ApiErrorType {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.message, "details": details }),
            None => json!({ "error": self.message }),
        };

        (self.status_code, Json(body)).into_response()
    }
}
