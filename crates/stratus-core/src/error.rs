//! Shared error taxonomy for the Stratus data layer.
//!
//! Every failure that can reach the UI is classified into one `ErrorKind`
//! bucket. `user_message()` produces the short display text; raw provider
//! error text is only surfaced for API errors, which already carry a
//! human-readable message from the remote service.

use thiserror::Error;

/// Classified failure surfaced by the data layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connectivity or fetch-level failure (DNS, connection reset, ...).
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response from a remote provider.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Explicit timeout or aborted request.
    #[error("Request timed out")]
    Timeout,

    /// Geolocation permission denied by the user or platform.
    #[error("Location permission denied")]
    Permission,

    /// Missing or invalid application configuration (e.g. no API key).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything that doesn't fit the buckets above.
    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl ErrorKind {
    /// Short human-readable message suitable for UI display.
    ///
    /// API errors show the provider-supplied message since it is already
    /// informative; everything else maps to a fixed generic string.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Unable to connect. Check your internet connection.".to_string(),
            Self::Api { message, .. } => format!("Weather service error: {}", message),
            Self::Timeout => "The request timed out. Please try again.".to_string(),
            Self::Permission => {
                "Location access was denied. Grant permission or search for a city.".to_string()
            }
            Self::Config(_) => "The app is not configured correctly.".to_string(),
            Self::Unknown(_) => "Something went wrong. Please try again.".to_string(),
        }
    }

    /// Whether a retry of the failed operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Api { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            Self::Permission | Self::Config(_) | Self::Unknown(_) => false,
        }
    }
}

impl From<reqwest::Error> for ErrorKind {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if err.is_connect() {
            return Self::Network(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::Api {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        if err.is_request() || err.is_body() || err.is_decode() {
            return Self::Network(err.to_string());
        }
        Self::Unknown(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_message_shown_verbatim() {
        let err = ErrorKind::Api {
            status: 401,
            message: "Invalid API key".to_string(),
        };
        assert!(err.user_message().contains("Invalid API key"));
    }

    #[test]
    fn test_unknown_message_is_generic() {
        let err = ErrorKind::Unknown("reqwest::Error { kind: Decode }".to_string());
        assert!(!err.user_message().contains("reqwest"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::Network("reset".into()).is_retryable());
        assert!(ErrorKind::Api { status: 503, message: String::new() }.is_retryable());
        assert!(ErrorKind::Api { status: 429, message: String::new() }.is_retryable());
        assert!(!ErrorKind::Api { status: 404, message: String::new() }.is_retryable());
        assert!(!ErrorKind::Permission.is_retryable());
        assert!(!ErrorKind::Config("no key".into()).is_retryable());
    }
}
