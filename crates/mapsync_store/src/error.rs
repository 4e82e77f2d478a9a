//! Error types for the document store.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] mapsync_codec::CodecError),

    /// Another process holds the store open.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// The mutation log is damaged before its final frame.
    #[error("log corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Offset of the first bad frame.
        offset: u64,
        /// Description of the damage.
        message: String,
    },

    /// A read extended past the end of the log.
    #[error("read beyond end of log: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current log size.
        size: u64,
    },

    /// The store path is unusable.
    #[error("invalid store location: {0}")]
    InvalidLocation(String),

    /// The store has been closed.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }
}
