//! Error types for RelStore core.

use relstore_codec::{CodecError, CompositeId};
use relstore_storage::StoreError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in RelStore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A record that must be addressable has no id assigned.
    #[error("record of type {type_tag} has no id")]
    Identity {
        /// Type of the record.
        type_tag: String,
    },

    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A relationship patch targeted a record that is not in the store.
    #[error("dangling reference: {id} is not stored")]
    DanglingReference {
        /// The missing record.
        id: CompositeId,
    },

    /// A stored hash does not have the shape a patch expects.
    #[error("corrupt hash for {id}: {message}")]
    CorruptHash {
        /// The record whose hash is malformed.
        id: CompositeId,
        /// Description of the problem.
        message: String,
    },

    /// An index scan failed part way through.
    #[error("query on {type_tag} failed: {source}")]
    Query {
        /// Type being scanned.
        type_tag: String,
        /// The cursor failure.
        #[source]
        source: StoreError,
    },

    /// A commit batch was malformed.
    #[error("invalid batch: {message}")]
    InvalidBatch {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an identity error.
    pub fn identity(type_tag: impl Into<String>) -> Self {
        Self::Identity {
            type_tag: type_tag.into(),
        }
    }

    /// Creates a corrupt hash error.
    pub fn corrupt_hash(id: CompositeId, message: impl Into<String>) -> Self {
        Self::CorruptHash {
            id,
            message: message.into(),
        }
    }

    /// Creates a query error.
    pub fn query(type_tag: impl Into<String>, source: StoreError) -> Self {
        Self::Query {
            type_tag: type_tag.into(),
            source,
        }
    }

    /// Creates an invalid batch error.
    pub fn invalid_batch(message: impl Into<String>) -> Self {
        Self::InvalidBatch {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if the error reflects broken data or misuse rather than
    /// a failing store. Fatal errors are never worth retrying.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Identity { .. }
            | Self::DanglingReference { .. }
            | Self::CorruptHash { .. }
            | Self::InvalidBatch { .. }
            | Self::InvalidOperation { .. }
            | Self::Codec(_) => true,
            Self::Store(err) | Self::Query { source: err, .. } => !err.is_io_failure(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(CoreError::identity("Post").is_fatal());
        assert!(CoreError::DanglingReference {
            id: CompositeId::new("Post", "1")
        }
        .is_fatal());
        assert!(!CoreError::Store(StoreError::unavailable("memory")).is_fatal());
        assert!(!CoreError::query("Post", StoreError::unavailable("memory")).is_fatal());
        assert!(CoreError::Store(StoreError::KeyConflict {
            id: CompositeId::new("Post", "1")
        })
        .is_fatal());
    }

    #[test]
    fn display_names_the_record() {
        let err = CoreError::DanglingReference {
            id: CompositeId::new("Post", 2_i64),
        };
        assert_eq!(err.to_string(), "dangling reference: Post:2 is not stored");
    }
}
