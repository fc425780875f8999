//! Error types for model operations.
//!
//! This module defines structured error types for property-bag access, tracking
//! misuse, and notification-deferral misuse. Schema-compilation failures live in
//! [`SchemaError`]; they are cached per type and re-raised by every factory call
//! for that type.

use thiserror::Error;

/// Structured error types for model operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ModelError {
    /// The schema for this type declares no such property
    #[error("Type '{type_name}' has no property '{property}'")]
    UnknownProperty { type_name: String, property: String },

    /// The property was declared read-only and has no setter
    #[error("Property '{property}' of type '{type_name}' is read-only")]
    ReadOnlyProperty { type_name: String, property: String },

    /// A typed accessor found a value of a different kind
    #[error("Property '{property}' holds a {actual} value, expected {expected}")]
    TypeMismatch {
        property: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// A tracking operation was invoked on an instance produced without the
    /// tracking factory
    #[error("Instance of '{type_name}' is not tracked: {operation} requires an original-value shadow")]
    NotTracked {
        type_name: String,
        operation: &'static str,
    },

    /// `defer_property_changes` was called while a deferral scope was already live
    #[error("Property changes of '{type_name}' are already deferred")]
    AlreadyDeferred { type_name: String },

    /// `begin_init` was called while the instance reports changes
    #[error("Cannot begin initialization of '{type_name}' while it has pending changes")]
    BeginInitWhileChanged { type_name: String },

    /// `end_init` was called without a matching `begin_init`
    #[error("end_init called on '{type_name}' without a matching begin_init")]
    EndInitWithoutBegin { type_name: String },

    /// An operation that commits or discards changes ran during initialization
    #[error("Cannot {operation} on '{type_name}' while it is initializing")]
    OperationWhileInitializing {
        type_name: String,
        operation: &'static str,
    },
}

impl ModelError {
    /// Check if this error is an unknown-property lookup failure.
    pub fn is_unknown_property(&self) -> bool {
        matches!(self, ModelError::UnknownProperty { .. })
    }

    /// Check if this error reports a write to a read-only property.
    pub fn is_read_only(&self) -> bool {
        matches!(self, ModelError::ReadOnlyProperty { .. })
    }

    /// Check if this error reports an operation invalid in the current state.
    pub fn is_invalid_operation(&self) -> bool {
        matches!(
            self,
            ModelError::AlreadyDeferred { .. }
                | ModelError::BeginInitWhileChanged { .. }
                | ModelError::EndInitWithoutBegin { .. }
                | ModelError::OperationWhileInitializing { .. }
        )
    }

    /// Check if this error reports tracking misuse on an untracked instance.
    pub fn is_not_tracked(&self) -> bool {
        matches!(self, ModelError::NotTracked { .. })
    }
}

/// Structured error types for schema compilation.
///
/// These are detected when a type's declaration is first compiled. The failed result
/// is cached in the registry, so every subsequent factory call for the same type
/// re-raises the same error.
#[non_exhaustive]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// Two declarations used the same property name
    #[error("Type '{type_name}' declares property '{property}' more than once")]
    DuplicateProperty { type_name: String, property: String },

    /// A declaration used a property name the library raises itself
    #[error("Property name '{property}' of type '{type_name}' is reserved")]
    ReservedProperty { type_name: String, property: String },

    /// A property name failed validation
    #[error("Invalid property name '{property}' for type '{type_name}': {reason}")]
    InvalidPropertyName {
        type_name: String,
        property: String,
        reason: String,
    },

    /// A dependency declaration names a property the type does not declare
    #[error("Property '{property}' of type '{type_name}' depends on undeclared property '{depends_on}'")]
    UnknownDependency {
        type_name: String,
        property: String,
        depends_on: String,
    },
}

impl SchemaError {
    /// Check if this error reports a name collision.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, SchemaError::DuplicateProperty { .. })
    }

    /// Check if this error reports a dangling dependency edge.
    pub fn is_unknown_dependency(&self) -> bool {
        matches!(self, SchemaError::UnknownDependency { .. })
    }
}
