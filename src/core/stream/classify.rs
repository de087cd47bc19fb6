//! Upstream failure classification
//!
//! The class drives the client's retry policy: NOT_FOUND and FORBIDDEN are
//! terminal, RATE_LIMITED and UNAVAILABLE are worth retrying.

use crate::core::http::TransportError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureClass {
    NotFound,
    RateLimited,
    Forbidden,
    Unavailable,
}

impl FailureClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureClass::RateLimited | FailureClass::Unavailable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::NotFound => "NOT_FOUND",
            FailureClass::RateLimited => "RATE_LIMITED",
            FailureClass::Forbidden => "FORBIDDEN",
            FailureClass::Unavailable => "UNAVAILABLE",
        }
    }
}

/// Map a non-success upstream status to its failure class
pub fn classify_status(status: u16) -> FailureClass {
    match status {
        404 => FailureClass::NotFound,
        429 => FailureClass::RateLimited,
        403 => FailureClass::Forbidden,
        _ => FailureClass::Unavailable,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Channel not found: {0}")]
    UnknownChannel(String),
    #[error("Upstream stream not found (HTTP 404)")]
    NotFound,
    #[error("Upstream rate limited (HTTP 429)")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("Upstream refused access (HTTP 403), egress {} may be blocked", .egress.as_deref().unwrap_or("region"))]
    Forbidden {
        /// Last known egress location, e.g. "Amsterdam, NL"
        egress: Option<String>,
    },
    #[error("Upstream unavailable: {reason}")]
    Unavailable {
        upstream_status: Option<u16>,
        reason: String,
    },
    /// Origin failed after the response head went out; the client connection is cut
    #[error("Upstream stream ended abruptly after {bytes} bytes: {reason}")]
    Interrupted { bytes: u64, reason: String },
    /// Not an upstream failure, so it carries no class
    #[error("Client disconnected after {bytes} bytes")]
    ClientDisconnected { bytes: u64 },
}

impl StreamError {
    /// Build the error for an upstream status outside 2xx
    pub fn from_status(status: u16, retry_after_secs: Option<u64>) -> Self {
        match classify_status(status) {
            FailureClass::NotFound => StreamError::NotFound,
            FailureClass::RateLimited => StreamError::RateLimited { retry_after_secs },
            FailureClass::Forbidden => StreamError::Forbidden { egress: None },
            FailureClass::Unavailable => StreamError::Unavailable {
                upstream_status: Some(status),
                reason: format!("HTTP {}", status),
            },
        }
    }

    /// `None` for a client hang-up
    pub fn class(&self) -> Option<FailureClass> {
        match self {
            StreamError::UnknownChannel(_) | StreamError::NotFound => Some(FailureClass::NotFound),
            StreamError::RateLimited { .. } => Some(FailureClass::RateLimited),
            StreamError::Forbidden { .. } => Some(FailureClass::Forbidden),
            StreamError::Unavailable { .. } | StreamError::Interrupted { .. } => {
                Some(FailureClass::Unavailable)
            }
            StreamError::ClientDisconnected { .. } => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class().is_some_and(FailureClass::is_retryable)
    }

    /// Whether a status line can still be sent to the client
    pub fn headers_sent(&self) -> bool {
        matches!(
            self,
            StreamError::Interrupted { .. } | StreamError::ClientDisconnected { .. }
        )
    }

    /// Status the client-facing layer should answer with; `None` when nobody is listening
    pub fn http_status(&self) -> Option<u16> {
        self.class().map(|class| match class {
            FailureClass::NotFound => 404,
            FailureClass::RateLimited => 429,
            FailureClass::Forbidden => 403,
            FailureClass::Unavailable => 502,
        })
    }

    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            StreamError::NotFound => Some(404),
            StreamError::RateLimited { .. } => Some(429),
            StreamError::Forbidden { .. } => Some(403),
            StreamError::Unavailable { upstream_status, .. } => *upstream_status,
            _ => None,
        }
    }

    pub fn to_failure(&self) -> Option<StreamFailure> {
        let retry_after_secs = match self {
            StreamError::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        };

        Some(StreamFailure {
            class: self.class()?,
            retryable: self.is_retryable(),
            message: self.to_string(),
            upstream_status: self.upstream_status(),
            retry_after_secs,
        })
    }
}

impl From<TransportError> for StreamError {
    fn from(error: TransportError) -> Self {
        StreamError::Unavailable {
            upstream_status: None,
            reason: error.to_string(),
        }
    }
}

/// Structured error body handed to clients instead of a raw error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFailure {
    pub class: FailureClass,
    pub retryable: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}
