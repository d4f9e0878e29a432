//! Gateway error types and retry classification.

use retry_queue::RetryableError;
use thiserror::Error;

/// Error type for Supabase API operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Network-level failure (connect, timeout, TLS)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response from the API
    #[error("Supabase API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The password grant was rejected
    #[error("Invalid login credentials")]
    InvalidCredentials,

    /// Sign-up attempted with an already registered email
    #[error("Email already registered")]
    EmailTaken,

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Response body did not match the expected shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Whether this failure was caused by backend rate limiting.
    ///
    /// Supabase signals rate limits with HTTP 429, but some GoTrue
    /// responses only carry it in the message text.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            GatewayError::Api { status, message } => {
                *status == 429 || message.to_lowercase().contains("rate limit")
            }
            _ => false,
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Http(err) => err.is_connect() || err.is_timeout(),
            GatewayError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the API rejected the token because its user no longer
    /// exists (account deleted server-side).
    pub fn is_user_missing(&self) -> bool {
        match self {
            GatewayError::Api { status, message } => {
                *status == 404
                    || message.contains("user_not_found")
                    || message.contains("User not found")
            }
            _ => false,
        }
    }
}

impl RetryableError for GatewayError {
    fn is_rate_limited(&self) -> bool {
        GatewayError::is_rate_limited(self)
    }
}

/// Classify a non-2xx API response into a gateway error.
pub(crate) fn classify_api_error(status: u16, message: &str) -> GatewayError {
    if message.contains("Invalid login credentials") {
        return GatewayError::InvalidCredentials;
    }
    if message.contains("already registered") || message.contains("already been registered") {
        return GatewayError::EmailTaken;
    }
    GatewayError::Api {
        status,
        message: message.to_string(),
    }
}

/// Extract a human-readable message from an API error body.
///
/// GoTrue and PostgREST use different field names depending on version
/// and endpoint; fall back to the raw body when none match.
pub(crate) fn parse_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["msg", "message", "error_description", "error"] {
            if let Some(text) = value.get(field).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    body.to_string()
}
