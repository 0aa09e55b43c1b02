//! Error types for the HTTP API.

use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::webhooks::WebhookError;

/// Errors returned by API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Registry or dispatch rejected the request
    #[error(transparent)]
    Webhook(#[from] WebhookError),

    /// Body was not JSON or had fields of the wrong type
    #[error("Invalid request body: {0}")]
    BadBody(String),

    /// Registration rate limit exhausted
    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },
}

/// Error body: `{"error": "..."}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadBody(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Webhook(WebhookError::InvalidInput(detail)) | ApiError::BadBody(detail) => {
                tracing::debug!(detail = %detail, "Rejected invalid input");
                (StatusCode::BAD_REQUEST, "Invalid Inputs")
            }
            ApiError::Webhook(WebhookError::NotFound(id)) => {
                tracing::debug!(subscription_id = %id, "Webhook not found");
                (StatusCode::NOT_FOUND, "Webhook not found")
            }
            ApiError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "Too many requests"),
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: message.to_string(),
            }),
        )
            .into_response();

        if let ApiError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

/// Result alias for handlers
pub type ApiResult<T> = Result<T, ApiError>;
