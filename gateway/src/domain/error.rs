//! Gateway errors
//!
//! Every backend maps its native failures onto this taxonomy so callers can
//! decide what is worth retrying.

use serde::{Deserialize, Serialize};

/// Common result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway-level errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum GatewayError {
    /// The store could not be reached or the connection broke mid-request.
    #[error("transport error: {0}")]
    Transport(String),
    /// A round trip did not complete in time.
    #[error("request timed out")]
    Timeout,
    /// The store refused the request (constraint violation, authorization).
    #[error("rejected by store: {0}")]
    Rejected(String),
    /// The targeted row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A payload did not have the expected shape.
    #[error("malformed payload: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Whether repeating the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::Timeout)
    }
}
