//! Error types for the trigger endpoint.

use mapsync_sync_engine::SyncError;
use thiserror::Error;

/// Result type for trigger operations.
pub type TriggerResult<T> = Result<T, TriggerError>;

/// Errors that can occur in the trigger endpoint.
#[derive(Error, Debug)]
pub enum TriggerError {
    /// The request did not carry the expected bearer token.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// The configuration cannot be served.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The sync run failed.
    #[error("sync failed: {0}")]
    Sync(#[from] SyncError),

    /// The blocking task running the sync did not complete.
    #[error("sync task failed: {0}")]
    Task(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TriggerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(self, TriggerError::Unauthorized(_))
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            TriggerError::Sync(_) | TriggerError::Task(_) | TriggerError::Io(_)
        )
    }
}
