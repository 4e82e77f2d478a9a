//! Error types for the sync engine.

use mapsync_codec::CodecError;
use mapsync_store::StoreError;
use std::fmt;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// What went wrong on an upstream round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection failure or an interrupted body.
    Network,
    /// The round-trip exceeded the configured timeout.
    Timeout,
    /// The upstream answered with a non-2xx status.
    Status(u16),
    /// The response body could not be decoded.
    Decode,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => f.write_str("network"),
            Self::Timeout => f.write_str("timeout"),
            Self::Status(code) => write!(f, "status {code}"),
            Self::Decode => f.write_str("decode"),
        }
    }
}

/// Errors that can occur during a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Upstream fetch failed.
    #[error("transport error ({kind}): {message}")]
    Transport {
        /// Failure class.
        kind: TransportErrorKind,
        /// Error message.
        message: String,
    },

    /// The upstream page reported errors of its own.
    #[error("upstream reported errors: {errors}")]
    Upstream {
        /// The `errors` field as JSON.
        errors: String,
    },

    /// Local store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No cursor has been written under this name yet.
    #[error("cursor not found: {name}")]
    CursorNotFound {
        /// Cursor name.
        name: String,
    },

    /// A persisted cursor has the wrong shape.
    #[error("invalid cursor {name}: {message}")]
    InvalidCursor {
        /// Cursor name.
        name: String,
        /// What is wrong with it.
        message: String,
    },

    /// A run was requested while another is active.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Encoding a request failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl SyncError {
    /// Creates a transport error.
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
        }
    }

    /// Creates a transport error for an undecodable response.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::transport(TransportErrorKind::Decode, message)
    }

    /// Returns the transport failure class, if this is a transport error.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns true for [`SyncError::CursorNotFound`].
    pub fn is_cursor_not_found(&self) -> bool {
        matches!(self, Self::CursorNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SyncError::transport(TransportErrorKind::Status(502), "bad gateway");
        assert_eq!(err.to_string(), "transport error (status 502): bad gateway");

        let err = SyncError::CursorNotFound {
            name: "current".into(),
        };
        assert_eq!(err.to_string(), "cursor not found: current");
        assert!(err.is_cursor_not_found());
    }

    #[test]
    fn transport_kind() {
        assert_eq!(
            SyncError::decode("not json").transport_kind(),
            Some(TransportErrorKind::Decode)
        );
        assert_eq!(SyncError::Store(StoreError::Closed).transport_kind(), None);
    }
}
