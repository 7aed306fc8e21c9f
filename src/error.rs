//! Synchronization errors

use bulletin_gateway::GatewayError;

/// Common result type for board operations
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("User not authenticated")]
    NotAuthenticated,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Local precondition: the target is not in the current snapshot
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: GatewayError },
    /// The post row exists remotely but its action items were not stored
    #[error("post {post_id} was created but its action items were not: {source}")]
    PartialCreate {
        post_id: String,
        source: GatewayError,
    },
    #[error("Malformed row: {0}")]
    Decode(String),
}

impl SyncError {
    /// The underlying gateway failure, if any
    pub fn gateway_error(&self) -> Option<&GatewayError> {
        match self {
            SyncError::Gateway(e) => Some(e),
            SyncError::RetriesExhausted { last, .. } => Some(last),
            SyncError::PartialCreate { source, .. } => Some(source),
            _ => None,
        }
    }
}
