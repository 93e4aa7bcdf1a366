//! Error types for the plan session
//!
//! Every failure is recoverable: callers show [`SessionError::user_message`]
//! and keep whatever plan and override selections they already had.

use thiserror::Error;

/// Message recorded when the event channel drops without a terminal event
pub const CONNECTION_LOST: &str = "Connection lost";

/// Session error type
#[derive(Debug, Error)]
pub enum SessionError {
    /// No valid session with the service; the user must log in
    #[error("Not authenticated")]
    Unauthenticated,

    /// The service answered a request with a non-success status
    #[error("Request failed ({status}): {message}")]
    RequestFailed { status: u16, message: String },

    /// The service reported a failure on the event channel
    #[error("Operation failed: {0}")]
    StreamError(String),

    /// The event channel dropped without a terminal event
    #[error("Connection lost")]
    ConnectionLost,

    /// Rejected locally; no request was sent
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The request never got a response
    #[error("Network error: {0}")]
    Network(String),

    /// A response body could not be understood
    #[error("Decode error: {0}")]
    Decode(String),

    /// Storage or configuration error
    #[error(transparent)]
    Common(#[from] plsort_common::Error),
}

impl SessionError {
    /// Whether repeating the same action unchanged may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::ConnectionLost | Self::StreamError(_) => true,
            Self::RequestFailed { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Text suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthenticated => "Not logged in. Run `plsort-ui login` to start.".to_string(),
            Self::RequestFailed { message, .. } => message.clone(),
            Self::StreamError(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
