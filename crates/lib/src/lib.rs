//!
//! Telltale: a library for building observable, change-tracking domain models in-process.
//! Domain objects declare properties; the library produces instances whose writes fan out
//! as property-change notifications, participate in a small reactive stream algebra, and
//! (for tracked instances) record original values so a snapshot can be accepted or
//! rejected atomically.
//!
//! ## Core Concepts
//!
//! * **Values (`model::Value`)**: the dynamic value kind stored in property slots. Leaf
//!   values compare structurally; branch values (`Model`, `List`) are shared handles that
//!   compare structurally but can also be compared by identity.
//! * **Schemas (`model::Schema`)**: per-type property dictionaries in declaration order,
//!   compiled once per process from a `ModelType` declaration and cached.
//! * **Models (`model::Model`)**: observable instances. Writes diff against the stored
//!   value and raise per-property notifications, with dependency fan-out and deferral.
//!   Tracked instances additionally shadow original values and expose
//!   accept/reject semantics that compose through nested trackables.
//! * **Notifiers (`notify::Notifier`)**: the multicast primitive behind every event in
//!   the crate. Handler slots may be strong or weak; hot streams are unbounded channels.
//! * **Subjects (`stream`)**: hot multicast streams with optional current-value memory,
//!   plus the small operator set the rest of the crate is tested with.
//! * **Collections (`collection`)**: observable list and keyed-list containers raising
//!   structural change events, with persisted stable sorting, derived views, and
//!   trackable variants that produce a change set against a lazily captured original.
//! * **Path observation (`path`)**: dotted property paths (`"a.b.c"`) observed across a
//!   chain of models, rewired whenever an intermediate value is replaced.

pub mod collection;
pub mod constants;
pub mod model;
pub mod notify;
pub mod path;
pub mod stream;

pub use collection::{KeyedList, ObservableList, TrackedKeyedList, TrackedList};
pub use model::{
    Model, Value, create_observable, create_observable_with, create_trackable,
    create_trackable_with,
};
pub use notify::Subscription;
pub use path::PathObserver;

/// Result type used throughout the Telltale library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Telltale library.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Structured model errors: unknown properties, tracking misuse, deferral misuse.
    #[error(transparent)]
    Model(#[from] model::ModelError),

    /// Structured schema-compilation errors, cached and re-raised per create call.
    #[error(transparent)]
    Schema(#[from] model::SchemaError),

    /// Structured collection errors: bad indexes, duplicate keys, missing keys.
    #[error(transparent)]
    Collection(#[from] collection::CollectionError),

    /// Structured property-path errors, including unresolvable path steps.
    #[error(transparent)]
    Path(#[from] path::PathError),

    /// Structured stream errors: empty sequences, cancellation, aborted subjects.
    #[error(transparent)]
    Stream(#[from] stream::StreamError),
}

impl Error {
    /// Check if this error indicates something was not found
    /// (a missing key, property, or path step).
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Model(e) => e.is_unknown_property(),
            Error::Collection(e) => e.is_key_not_found(),
            Error::Path(e) => e.is_missing_property(),
            _ => false,
        }
    }

    /// Check if this error indicates an operation invalid in the current state
    /// (initialization misuse, deferral misuse, accept/reject while initializing).
    pub fn is_invalid_operation(&self) -> bool {
        match self {
            Error::Model(e) => e.is_invalid_operation(),
            Error::Collection(e) => e.is_invalid_operation(),
            _ => false,
        }
    }

    /// Check if this error indicates a tracking operation on an untracked instance.
    pub fn is_not_tracked(&self) -> bool {
        matches!(self, Error::Model(model::ModelError::NotTracked { .. }))
    }

    /// Check if this error indicates an out-of-range collection index.
    pub fn is_out_of_range(&self) -> bool {
        matches!(
            self,
            Error::Collection(collection::CollectionError::IndexOutOfRange { .. })
        )
    }

    /// Check if this error came from the stream layer.
    pub fn is_stream_error(&self) -> bool {
        matches!(self, Error::Stream(_))
    }
}
