//! Observable collections.
//!
//! [`ObservableList`] is the ordered container every other collection builds on: it
//! raises structural [`CollectionEvent`]s and collection-property changes (`count`,
//! `item`, `first`, `last`, `is_empty`) through the same notifier machinery models
//! use. [`KeyedList`] adds a key selector and a `key → index` mapping kept exact
//! across every structural change. [`TrackedList`] and [`TrackedKeyedList`] overlay
//! original-snapshot accounting: the original is captured lazily on the first
//! out-of-initialization mutation, `is_changed` summarizes divergence from it, and
//! [`ItemChange`] records describe the difference. Derived views (map, combine,
//! new-items, aggregate) subscribe weakly to their source, so dropping a view
//! detaches it.

pub mod errors;
mod keyed;
mod list;
mod tracked;
mod tracked_keyed;
mod views;

use std::fmt;

pub use errors::CollectionError;
pub use keyed::KeyedList;
pub use list::{BoundCollection, ObservableList};
pub use tracked::TrackedList;
pub use tracked_keyed::TrackedKeyedList;
pub use views::{Aggregate, CombinedView, MappedView, NewItems, NewItemsView, combine_view};

use crate::model::{Model, Value};

/// A structural change raised by an observable collection.
#[derive(Clone, Debug)]
pub enum CollectionEvent<T> {
    /// Items were inserted at `index`.
    Add { index: usize, items: Vec<T> },
    /// Items were removed from `index`.
    Remove { index: usize, items: Vec<T> },
    /// The item at `index` was replaced.
    Replace { index: usize, old: T, new: T },
    /// An item moved between positions.
    Move { from: usize, to: usize, item: T },
    /// The collection was rebuilt wholesale.
    Reset,
}

/// A collection-level property change (`count`, `item`, `first`, `last`, `is_empty`,
/// `is_changed`, `value`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionPropertyChanged {
    /// The property name that changed.
    pub property: String,
}

/// A property change raised by an item contained in a collection.
#[derive(Clone, Debug)]
pub struct ItemChanged<T> {
    /// The contained item that raised.
    pub item: T,
    /// The property that changed on it.
    pub property: String,
}

/// One entry of a collection change set.
#[derive(Clone, Debug)]
pub enum ItemChange<T> {
    /// The item is present now but was not in the original.
    Added(T),
    /// The item was in the original but is gone.
    Removed(T),
    /// The item is present on both sides but differs (content or position).
    Changed {
        /// The item as currently contained.
        current: T,
        /// The original counterpart, when an original was captured.
        original: Option<T>,
    },
}

impl<T> ItemChange<T> {
    /// The current-side item of this change, if it has one.
    pub fn item(&self) -> Option<&T> {
        match self {
            ItemChange::Added(item) => Some(item),
            ItemChange::Removed(_) => None,
            ItemChange::Changed { current, .. } => Some(current),
        }
    }

    /// Check if this change is an addition.
    pub fn is_added(&self) -> bool {
        matches!(self, ItemChange::Added(_))
    }

    /// Check if this change is a removal.
    pub fn is_removed(&self) -> bool {
        matches!(self, ItemChange::Removed(_))
    }

    /// Check if this change is a content or position change.
    pub fn is_changed(&self) -> bool {
        matches!(self, ItemChange::Changed { .. })
    }
}

/// The contract items of observable collections satisfy.
///
/// `item_eq` is the structural comparison; `same_identity` is the identity
/// discipline (handle identity for models and values holding them, structural
/// equality for plain values). `OBSERVABLE` states whether items can raise property
/// changes of their own — it gates the per-item change stream at the type level,
/// which is why plain value types simply have no such stream.
pub trait Item: Clone + Send + Sync + 'static {
    /// Whether contained items can raise property changes.
    const OBSERVABLE: bool = false;

    /// Structural equality.
    fn item_eq(&self, other: &Self) -> bool;

    /// Identity equality; falls back to structural for plain values.
    fn same_identity(&self, other: &Self) -> bool {
        self.item_eq(other)
    }

    /// The model behind this item, when there is one.
    fn as_model(&self) -> Option<&Model> {
        None
    }

    /// Name of the item type, for diagnostics.
    fn item_type() -> &'static str {
        std::any::type_name::<Self>()
    }
}

macro_rules! impl_plain_item {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Item for $ty {
                fn item_eq(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )+
    };
}

impl_plain_item!(bool, i32, i64, u32, u64, usize, String);

impl Item for Model {
    const OBSERVABLE: bool = true;

    fn item_eq(&self, other: &Self) -> bool {
        self.structural_eq(other)
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }

    fn as_model(&self) -> Option<&Model> {
        Some(self)
    }
}

impl Item for Value {
    const OBSERVABLE: bool = true;

    fn item_eq(&self, other: &Self) -> bool {
        self == other
    }

    fn same_identity(&self, other: &Self) -> bool {
        Value::same_identity(self, other)
    }

    fn as_model(&self) -> Option<&Model> {
        Value::as_model(self)
    }
}

/// Whether a current item still matches its baseline counterpart.
///
/// A tracked model matches when its originals equal the current side's values, so an
/// item compared against itself matches exactly when it has no pending changes. Plain
/// values compare structurally.
pub(crate) fn matches_baseline<T: Item>(original: &T, current: &T) -> bool {
    if let Some(original_model) = original.as_model()
        && original_model.is_tracked()
        && let Some(current_model) = current.as_model()
    {
        return original_model
            .original_equals(current_model)
            .unwrap_or(false);
    }
    original.item_eq(current)
}

/// Key bounds for keyed collections.
pub trait Key: Eq + std::hash::Hash + Clone + fmt::Debug + Send + Sync + 'static {}

impl<K: Eq + std::hash::Hash + Clone + fmt::Debug + Send + Sync + 'static> Key for K {}
