//! Error types for observable collections.

use thiserror::Error;

/// Structured error types for list and keyed-list operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CollectionError {
    /// An index argument was outside the collection bounds
    #[error("Index {index} is out of range for a collection of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Two items mapped to the same key
    #[error("Duplicate key {key} in keyed collection")]
    DuplicateKey { key: String },

    /// No item maps to the requested key
    #[error("Key {key} not found in keyed collection")]
    KeyNotFound { key: String },

    /// The per-item change stream was requested for a non-observable item type
    #[error("Item type '{item_type}' is not observable; the item change stream is not supported")]
    ItemsNotObservable { item_type: &'static str },

    /// `end_init` was called without a matching `begin_init`
    #[error("end_init called on a collection without a matching begin_init")]
    InitNotStarted,

    /// An operation that commits or discards changes ran during initialization
    #[error("Cannot {operation} on a collection while it is initializing")]
    OperationWhileInitializing { operation: &'static str },
}

impl CollectionError {
    /// Check if this error reports a missing key.
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, CollectionError::KeyNotFound { .. })
    }

    /// Check if this error reports a key collision.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, CollectionError::DuplicateKey { .. })
    }

    /// Check if this error reports an operation invalid in the current state.
    pub fn is_invalid_operation(&self) -> bool {
        matches!(
            self,
            CollectionError::InitNotStarted | CollectionError::OperationWhileInitializing { .. }
        )
    }

    /// Check if this error reports an out-of-range index.
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, CollectionError::IndexOutOfRange { .. })
    }
}
