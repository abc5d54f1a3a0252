//! Error types for web handlers.
//!
//! [`AppError`] bridges the core error taxonomy and HTTP responses,
//! implementing Axum's `IntoResponse`. Each core variant maps to one status
//! code and a stable machine-readable code; a few carry extra detail fields
//! the volunteer/student UIs rely on (`isRedeemed`, `student_name`).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;

use mess_coupon_core::error::CouponError;

/// Application error type for web handlers.
///
/// Wraps a status code, a user-facing message, a stable error code, and
/// optional structured details merged into the JSON body.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: String,
    details: Option<Value>,
    /// Internal error for logging, not exposed to the client.
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            details: None,
            source: None,
        }
    }

    /// Attach structured details to the JSON body.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach a source error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            message.into(),
            "BAD_REQUEST".to_string(),
        )
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// Create a 429 Too Many Requests error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            message.into(),
            "RATE_LIMITED".to_string(),
        )
    }

    /// The HTTP status this error renders as. Exposed for tests.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
    /// Extra context fields, merged flat into the body.
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Internal server error"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<CouponError> for AppError {
    fn from(err: CouponError) -> Self {
        let message = err.to_string();
        match err {
            CouponError::MalformedToken => Self::bad_request(message),
            CouponError::TokenNotFound => {
                Self::new(StatusCode::NOT_FOUND, message, "INVALID_TOKEN".to_string())
            }
            CouponError::VolunteerNotFound(_) => Self::new(
                StatusCode::NOT_FOUND,
                message,
                "VOLUNTEER_NOT_FOUND".to_string(),
            ),
            CouponError::StudentNotFound(_) => Self::new(
                StatusCode::NOT_FOUND,
                message,
                "STUDENT_NOT_FOUND".to_string(),
            ),
            CouponError::EventNotFound(_) => Self::new(
                StatusCode::NOT_FOUND,
                message,
                "EVENT_NOT_FOUND".to_string(),
            ),
            CouponError::AlreadyRedeemed => Self::new(
                StatusCode::BAD_REQUEST,
                message,
                "ALREADY_REDEEMED".to_string(),
            )
            .with_details(json!({ "isRedeemed": true })),
            CouponError::AlreadyServed { ref student_name } => Self::new(
                StatusCode::CONFLICT,
                message.clone(),
                "ALREADY_SERVED".to_string(),
            )
            .with_details(json!({ "student_name": student_name })),
            CouponError::RegistrationCancelled => {
                Self::new(StatusCode::CONFLICT, message, "CANCELLED".to_string())
            }
            CouponError::WrongEventScope => Self::new(
                StatusCode::FORBIDDEN,
                message,
                "WRONG_EVENT_SCOPE".to_string(),
            ),
            CouponError::NoSlotsAvailable => Self::new(
                StatusCode::NOT_FOUND,
                message,
                "NO_SLOTS_AVAILABLE".to_string(),
            ),
            CouponError::TokenCollision | CouponError::Database(_) => {
                Self::internal("Server error").with_source(anyhow::anyhow!(message))
            }
        }
    }
}
