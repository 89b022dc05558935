//! # Request Error Taxonomy
//!
//! Every failure the request layer can surface, classified so callers can
//! decide on retries without string matching. Only [`RequestError::Timeout`]
//! and [`RequestError::ServiceUnavailable`] are retryable.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

const NETWORK_MESSAGE: &str = "Network connection error. Please check your internet connection.";
const UNAVAILABLE_MESSAGE: &str = "Service temporarily unavailable. Please try again later.";
const AUTH_MESSAGE: &str = "Authentication failed. Please check your credentials.";
const VALIDATION_MESSAGE: &str = "Invalid input. Please check your data and try again.";
const RATE_LIMIT_MESSAGE: &str = "Too many requests. Please wait before trying again.";
const TIMEOUT_MESSAGE: &str = "Request timed out. Please try again.";
const UNKNOWN_MESSAGE: &str = "An unexpected error occurred. Please try again.";

/// Where a rate limit was enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOrigin {
    /// The client's own sliding window refused the request.
    Local,
    /// The server answered 429.
    Server,
}

impl fmt::Display for RateLimitOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitOrigin::Local => f.write_str("local window"),
            RateLimitOrigin::Server => f.write_str("server 429"),
        }
    }
}

/// A classified request failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    /// The call did not complete within the configured timeout.
    #[error("Request timeout after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// HTTP 401 or 403.
    #[error("Unauthorized ({status}) - check API key")]
    Unauthorized {
        /// The status received.
        status: u16,
    },

    /// Refused locally or by the server.
    #[error("Rate limit exceeded ({origin})")]
    RateLimited {
        /// Who refused the request.
        origin: RateLimitOrigin,
    },

    /// HTTP 5xx.
    #[error("Service temporarily unavailable ({status})")]
    ServiceUnavailable {
        /// The status received.
        status: u16,
    },

    /// Any other non-2xx status.
    #[error("API request failed: {status} {message}")]
    RequestFailed {
        /// The status received.
        status: u16,
        /// Server-provided message or the status reason.
        message: String,
    },

    /// No response was received at all.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A typed value was demanded from a body that is not valid JSON of that shape.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// A retryable failure persisted for every attempt.
    #[error("Max retry attempts exceeded ({attempts}): {last}")]
    MaxRetriesExceeded {
        /// Attempts made.
        attempts: u32,
        /// The final failure.
        last: Box<RequestError>,
    },

    /// Rejected before any network activity.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The endpoint could not be turned into a URL.
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

impl RequestError {
    /// Classifies a non-2xx status. `message` is the server's explanation, if any.
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        match status {
            401 | 403 => RequestError::Unauthorized { status },
            429 => RequestError::RateLimited {
                origin: RateLimitOrigin::Server,
            },
            s if s >= 500 => RequestError::ServiceUnavailable { status },
            _ => RequestError::RequestFailed {
                status,
                message: message.unwrap_or_default(),
            },
        }
    }

    /// True for the classes worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RequestError::Timeout(_) | RequestError::ServiceUnavailable { .. }
        )
    }

    /// HTTP status behind this error, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Unauthorized { status }
            | RequestError::ServiceUnavailable { status }
            | RequestError::RequestFailed { status, .. } => Some(*status),
            RequestError::RateLimited {
                origin: RateLimitOrigin::Server,
            } => Some(429),
            RequestError::MaxRetriesExceeded { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Wording suitable for showing to an operator.
    pub fn user_message(&self) -> &'static str {
        match self {
            RequestError::Timeout(_) => TIMEOUT_MESSAGE,
            RequestError::Unauthorized { .. } => AUTH_MESSAGE,
            RequestError::RateLimited { .. } => RATE_LIMIT_MESSAGE,
            RequestError::ServiceUnavailable { .. } => UNAVAILABLE_MESSAGE,
            RequestError::RequestFailed { status: 400, .. } | RequestError::InvalidInput(_) => {
                VALIDATION_MESSAGE
            }
            RequestError::NetworkError(_) => NETWORK_MESSAGE,
            RequestError::MaxRetriesExceeded { last, .. } => last.user_message(),
            RequestError::RequestFailed { .. }
            | RequestError::ParseError(_)
            | RequestError::InvalidUrl(_) => UNKNOWN_MESSAGE,
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // reqwest does not report the configured duration back.
            RequestError::Timeout(Duration::ZERO)
        } else if e.is_decode() {
            RequestError::ParseError(e.to_string())
        } else if e.is_builder() {
            RequestError::InvalidUrl(e.to_string())
        } else {
            RequestError::NetworkError(e.to_string())
        }
    }
}
