//! Constants used throughout the crate.
//!
//! Property names that the library itself raises. Domain schemas may not declare
//! properties with these names; the schema builder rejects the collision.

/// Property name raised when a tracked instance's `is_changed` summary toggles.
pub const IS_CHANGED: &str = "is_changed";

/// Collection property name raised when the element count changes.
pub const COUNT: &str = "count";

/// Collection property name raised when any indexed element changes.
pub const ITEM: &str = "item";

/// Collection property name raised when the first element changes.
pub const FIRST: &str = "first";

/// Collection property name raised when the last element changes.
pub const LAST: &str = "last";

/// Collection property name raised when emptiness toggles.
pub const IS_EMPTY: &str = "is_empty";

/// Property name raised by aggregates when their computed value may have changed.
pub const VALUE: &str = "value";
