use std::fmt;

use http::StatusCode;
use thiserror::Error;

/// Result alias used by the request pipeline
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced to callers of the request pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No response reached us (connect failure, timeout, DNS)
    #[error("Network request failed: {reason}")]
    Network { reason: String },

    /// The server rejected the credential with a 401
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Any other non-2xx response
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// A 2xx response whose body could not be decoded
    #[error("Failed to decode response: {reason}")]
    Decode { reason: String },
}

impl ApiError {
    /// Build an error from a failed response status and its raw body.
    ///
    /// The server's `message` field is preferred; otherwise the canonical
    /// reason phrase for the status is used.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = server_message(body).unwrap_or_else(|| canonical_reason(status));

        if status == StatusCode::UNAUTHORIZED.as_u16() {
            ApiError::Unauthorized { message }
        } else {
            ApiError::Http { status, message }
        }
    }

    /// Create a network error
    pub fn network(reason: impl fmt::Display) -> Self {
        ApiError::Network {
            reason: reason.to_string(),
        }
    }

    /// Create a decode error
    pub fn decode(reason: impl fmt::Display) -> Self {
        ApiError::Decode {
            reason: reason.to_string(),
        }
    }

    /// Returns true for the authorization-failure class (401)
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    /// HTTP status carried by this error, if a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED.as_u16()),
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Human-readable message suitable for a notification
    pub fn message(&self) -> String {
        match self {
            ApiError::Unauthorized { message } | ApiError::Http { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Error code for programmatic handling
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Network { .. } => ErrorCode::NetworkFailed,
            ApiError::Unauthorized { .. } => ErrorCode::AuthorizationFailed,
            ApiError::Http { status, .. } if *status >= 500 => ErrorCode::ServerError,
            ApiError::Http { .. } => ErrorCode::RequestRejected,
            ApiError::Decode { .. } => ErrorCode::ResponseInvalid,
        }
    }

    /// Category used to decide how the pipeline treats the failure
    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::Network { .. } => ErrorCategory::Network,
            ApiError::Unauthorized { .. } => ErrorCategory::Authentication,
            ApiError::Http { status, .. } if *status >= 500 => ErrorCategory::Service,
            ApiError::Http { .. } => ErrorCategory::Validation,
            ApiError::Decode { .. } => ErrorCategory::Internal,
        }
    }
}

/// Enumeration of error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NetworkFailed,
    AuthorizationFailed,
    RequestRejected,
    ServerError,
    ResponseInvalid,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code_str = match self {
            ErrorCode::NetworkFailed => "NETWORK_FAILED",
            ErrorCode::AuthorizationFailed => "AUTH_FAILED",
            ErrorCode::RequestRejected => "REQUEST_REJECTED",
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::ResponseInvalid => "RESPONSE_INVALID",
        };
        write!(f, "{}", code_str)
    }
}

/// Error category for filtering and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// No response was received
    Network,
    /// Credential rejected or missing
    Authentication,
    /// 4xx other than 401
    Validation,
    /// 5xx
    Service,
    /// Local failures such as undecodable bodies
    Internal,
}

/// Pull the `message` field out of a JSON error body
fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

fn canonical_reason(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Request failed with status {}", status))
}
