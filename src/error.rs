// Error handling module
// Defines the error taxonomy surfaced to callers of the client

use thiserror::Error;

use crate::auth::StoreError;

/// Errors that can occur while performing an authenticated request
#[derive(Error, Debug)]
pub enum HttpError {
    /// 401 received and no refresh endpoint is configured
    #[error("Session expired: re-authentication required")]
    SessionExpired,

    /// Token refresh failed, was abandoned, or the refresh cap was reached
    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    /// HTTP 500 from the resource server
    #[error("Server error: {status} - {body}")]
    Server { status: u16, body: String },

    /// HTTP 504 or a transport-level timeout
    #[error("Request timed out")]
    Timeout,

    /// Any other non-2xx response
    #[error("HTTP error: {status} - {body}")]
    Status { status: u16, body: String },

    /// Request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Refresh endpoint answered 2xx without the expected token fields
    #[error("Malformed refresh response: {0}")]
    MalformedRefresh(String),

    /// Network failure other than a timeout
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body did not match the requested response type
    #[error("Decode error: {0}")]
    Decode(String),

    /// Token store failure
    #[error("Token store error: {0}")]
    Store(#[from] StoreError),
}

impl HttpError {
    /// HTTP status carried by this error, if it came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::SessionExpired => Some(401),
            HttpError::Server { status, .. } | HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the caller has to sign in again to make progress
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            HttpError::SessionExpired | HttpError::SessionInvalid(_)
        )
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, HttpError>;
