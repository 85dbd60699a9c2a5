//! Error types for store operations.

use relstore_codec::{CodecError, CompositeId};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
///
/// Every gateway operation completes exactly once, with either a value or
/// one of these.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is closed or otherwise cannot serve requests.
    #[error("store unavailable: {store}")]
    Unavailable {
        /// Name of the store.
        store: String,
    },

    /// A create collided with an existing key.
    #[error("key conflict: {id} already exists")]
    KeyConflict {
        /// The conflicting key.
        id: CompositeId,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A hash or log frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The log file is corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// A write reached a store opened read-only.
    #[error("store is read-only: {store}")]
    ReadOnly {
        /// Name of the store.
        store: String,
    },

    /// Another process holds the store lock.
    #[error("store locked: {}", path.display())]
    Locked {
        /// Path of the lock file.
        path: PathBuf,
    },
}

impl StoreError {
    /// Creates an unavailable error.
    pub fn unavailable(store: impl Into<String>) -> Self {
        Self::Unavailable {
            store: store.into(),
        }
    }

    /// Creates a read-only error.
    pub fn read_only(store: impl Into<String>) -> Self {
        Self::ReadOnly {
            store: store.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Returns true for failures of the underlying engine rather than of the
    /// request itself.
    pub fn is_io_failure(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable { .. } | StoreError::Io(_) | StoreError::Corrupted(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(StoreError::unavailable("mem").is_io_failure());
        assert!(StoreError::Io(io::Error::other("disk")).is_io_failure());
        assert!(!StoreError::KeyConflict {
            id: CompositeId::new("Post", "1")
        }
        .is_io_failure());
        assert!(!StoreError::read_only("store.rslog").is_io_failure());
    }

    #[test]
    fn display() {
        let err = StoreError::KeyConflict {
            id: CompositeId::new("Post", "1"),
        };
        assert_eq!(err.to_string(), "key conflict: Post:1 already exists");
    }
}
