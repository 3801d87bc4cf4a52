use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure categories of a remote completion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    RateLimit,
    AuthError,
    NetworkError,
    ServerError,
    Unknown,
}

static SERVER_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b5\d{2}\b").expect("valid server status regex"));

impl FailureKind {
    pub const ALL: [FailureKind; 6] = [
        Self::Timeout,
        Self::RateLimit,
        Self::AuthError,
        Self::NetworkError,
        Self::ServerError,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::AuthError => "auth_error",
            Self::NetworkError => "network_error",
            Self::ServerError => "server_error",
            Self::Unknown => "unknown",
        }
    }

    /// Classify a rendered error message. First matching rule wins.
    pub fn from_description(description: &str) -> Self {
        let text = description.to_lowercase();

        if text.contains("timeout") {
            Self::Timeout
        } else if text.contains("rate limit") || text.contains("429") {
            Self::RateLimit
        } else if text.contains("api key") || text.contains("401") || text.contains("unauthorized") {
            Self::AuthError
        } else if text.contains("connection") || text.contains("network") {
            Self::NetworkError
        } else if text.contains("server") || SERVER_STATUS.is_match(&text) {
            Self::ServerError
        } else {
            Self::Unknown
        }
    }

    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimit,
            401 | 403 => Self::AuthError,
            408 => Self::Timeout,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single completion attempt failed.
#[derive(Error, Debug, Clone)]
pub enum CompletionError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Invalid API key (status {0})")]
    Unauthorized(u16),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Empty reply from completion API")]
    EmptyReply,

    #[error("{0}")]
    Other(String),
}

impl CompletionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) => FailureKind::Timeout,
            Self::RateLimited => FailureKind::RateLimit,
            Self::Unauthorized(_) => FailureKind::AuthError,
            Self::Network(_) => FailureKind::NetworkError,
            Self::Status { status, .. } => FailureKind::from_status(*status),
            Self::InvalidResponse(_) | Self::EmptyReply => FailureKind::Unknown,
            Self::Other(description) => FailureKind::from_description(description),
        }
    }
}

impl CompletionError {
    /// Map a reqwest failure. `timeout` is the client deadline that applied.
    pub fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_connect() || err.is_request() {
            Self::Network(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            Self::Other(err.to_string())
        }
    }
}
