//! Value types for model property slots.
//!
//! This module provides the Value enum that represents everything a property slot can
//! hold. Values are either leaf values (primitives) or branch values (a nested model or
//! a nested tracked list). Branch values are shared handles: cloning a `Value` clones
//! the handle, not the contents.
//!
//! # Equality disciplines
//!
//! `PartialEq` is structural, recursing through branch handles. Reference-only
//! properties compare with [`Value::same_identity`] instead, which compares branch
//! handles by pointer identity and falls back to structural equality for leaves.

use std::fmt;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use super::Model;
use crate::collection::TrackedList;

/// Values that can be stored in a model's property slots.
///
/// # Value Types
///
/// ## Leaf Values
/// - [`Value::Null`] - absent/empty values
/// - [`Value::Bool`] - booleans
/// - [`Value::Int`] - 64-bit signed integers
/// - [`Value::Text`] - UTF-8 strings
///
/// ## Branch Values (shared handles)
/// - [`Value::Model`] - a nested model instance
/// - [`Value::List`] - a nested tracked list of values
///
/// # Direct Comparisons
///
/// `Value` implements `PartialEq` against primitive types for ergonomic assertions:
///
/// ```
/// # use telltale::model::Value;
/// let text = Value::Text("hello".to_string());
/// let number = Value::Int(42);
///
/// assert!(text == "hello");
/// assert!(number == 42);
/// assert!(!(text == 42));
/// ```
#[derive(Clone)]
pub enum Value {
    /// Null/empty value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Text string value
    Text(String),
    /// Nested model instance
    Model(Model),
    /// Nested tracked list of values
    List(TrackedList<Value>),
}

impl Value {
    /// Returns true if this is a leaf value.
    pub fn is_leaf(&self) -> bool {
        !self.is_branch()
    }

    /// Returns true if this is a branch value (a shared handle).
    pub fn is_branch(&self) -> bool {
        matches!(self, Value::Model(_) | Value::List(_))
    }

    /// Returns true if this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the type name as a string.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Text(_) => "text",
            Value::Model(_) => "model",
            Value::List(_) => "list",
        }
    }

    /// Attempts to read as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to read as an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to read as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Attempts to read as a nested model.
    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Value::Model(m) => Some(m),
            _ => None,
        }
    }

    /// Attempts to read as a nested list.
    pub fn as_list(&self) -> Option<&TrackedList<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Identity comparison: branch handles compare by pointer, leaves structurally.
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Model(a), Value::Model(b)) => a.ptr_eq(b),
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            _ => self == other,
        }
    }

    /// The nested tracked instance behind this value, if any.
    ///
    /// A nested model qualifies only when it was produced by the tracking factory;
    /// a nested list always carries a shadow.
    pub(crate) fn tracked_model(&self) -> Option<&Model> {
        match self {
            Value::Model(m) if m.is_tracked() => Some(m),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Model(a), Value::Model(b)) => a.structural_eq(b),
            (Value::List(a), Value::List(b)) => a.items() == b.items(),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Text(s) => write!(f, "Text({s:?})"),
            Value::Model(m) => write!(f, "Model({})", m.type_name()),
            Value::List(l) => write!(f, "List(len={})", l.len()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Model(m) => write!(f, "{}", m.type_name()),
            Value::List(l) => write!(f, "[{} items]", l.len()),
        }
    }
}

/// One-way serialization for snapshot export. Models render as maps of their current
/// property values; lists render as sequences. There is deliberately no `Deserialize`:
/// models are only created through schemas and factories.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Model(m) => {
                let snapshot = m.snapshot();
                let mut map = serializer.serialize_map(Some(snapshot.len()))?;
                for (name, value) in snapshot {
                    map.serialize_entry(&name, &value)?;
                }
                map.end()
            }
            Value::List(l) => {
                let items = l.items();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&item)?;
                }
                seq.end()
            }
        }
    }
}

macro_rules! impl_value_from {
    ($($variant:ident: $($ty:ty),+;)+) => {
        $($(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value.into())
                }
            }
        )+)+
    };
}

impl_value_from! {
    Bool: bool;
    Int: i64, i32, u32;
    Text: String, &str;
    Model: Model;
    List: TrackedList<Value>;
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

macro_rules! impl_value_partial_eq {
    ($($ty:ty => $pat:pat => $expr:expr;)+) => {
        $(
            impl PartialEq<$ty> for Value {
                fn eq(&self, other: &$ty) -> bool {
                    match self {
                        $pat => $expr == *other,
                        _ => false,
                    }
                }
            }

            impl PartialEq<Value> for $ty {
                fn eq(&self, other: &Value) -> bool {
                    other == self
                }
            }
        )+
    };
}

impl_value_partial_eq! {
    bool => Value::Bool(b) => *b;
    i64 => Value::Int(n) => *n;
    &str => Value::Text(s) => s.as_str();
}

impl PartialEq<String> for Value {
    fn eq(&self, other: &String) -> bool {
        self == &other.as_str()
    }
}
