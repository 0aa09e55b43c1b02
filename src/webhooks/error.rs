//! Webhook Error Types
//!
//! Errors surfaced synchronously to callers of registry and dispatch
//! operations, plus the delivery failure record that only ever reaches the
//! delivery log.

/// Errors returned by registry and dispatch operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebhookError {
    /// A caller-supplied field is missing or malformed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The referenced subscription does not exist
    #[error("Webhook not found: {0}")]
    NotFound(String),
}

impl WebhookError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        WebhookError::InvalidInput(msg.into())
    }
}

/// Result alias for webhook operations
pub type WebhookResult<T> = Result<T, WebhookError>;

/// Outcome of a failed delivery attempt
///
/// Never returned to the event submitter; it drives the retry state machine
/// and is written to the delivery log.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DeliveryFailure {
    /// HTTP status if the endpoint answered at all
    pub status_code: Option<u16>,
    /// Human-readable description
    pub message: String,
}

impl DeliveryFailure {
    /// Endpoint answered with a non-success status
    pub fn status(code: u16) -> Self {
        Self {
            status_code: Some(code),
            message: format!("HTTP {}", code),
        }
    }

    /// No response was received (connect error, timeout, TLS, ...)
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
        }
    }
}
