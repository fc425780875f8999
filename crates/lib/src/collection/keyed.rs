//! The keyed observable list.
//!
//! Wraps [`ObservableList`] with a key selector and a `key → index` mapping. The
//! mapping is maintained by a structural-change handler registered before any
//! external subscriber, so by the time user handlers observe an event the index is
//! already exact. Key collisions are rejected before any mutation is applied.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use futures::Stream;

use super::list::WeakList;
use super::{
    CollectionError, CollectionEvent, CollectionPropertyChanged, Item, ItemChanged, Key,
    ObservableList,
};
use crate::notify::Subscription;

type KeySelector<K, T> = Arc<dyn Fn(&T) -> K + Send + Sync>;

pub(crate) struct KeyedInner<K: Key, T: Item> {
    key_fn: KeySelector<K, T>,
    index: Mutex<HashMap<K, usize>>,
    list: WeakList<T>,
    _sub: Mutex<Option<Subscription>>,
}

/// An observable list with unique keys and by-key access. Cloning clones the handle.
pub struct KeyedList<K: Key, T: Item> {
    list: ObservableList<T>,
    inner: Arc<KeyedInner<K, T>>,
}

impl<K: Key, T: Item> Clone for KeyedList<K, T> {
    fn clone(&self) -> Self {
        KeyedList {
            list: self.list.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<K: Key, T: Item> KeyedList<K, T> {
    /// Create an empty keyed list with the given key selector.
    pub fn new(key_fn: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        Self::build(Arc::new(key_fn), Vec::new()).expect("empty keyed list cannot collide")
    }

    /// Create a keyed list seeded from an iterable. Fails on duplicate keys.
    pub fn from_items(
        key_fn: impl Fn(&T) -> K + Send + Sync + 'static,
        items: impl IntoIterator<Item = T>,
    ) -> crate::Result<Self> {
        Ok(Self::build(Arc::new(key_fn), items.into_iter().collect())?)
    }

    fn build(key_fn: KeySelector<K, T>, items: Vec<T>) -> Result<Self, CollectionError> {
        let mut index = HashMap::new();
        for (position, item) in items.iter().enumerate() {
            let key = key_fn(item);
            if index.insert(key.clone(), position).is_some() {
                return Err(CollectionError::DuplicateKey {
                    key: format!("{key:?}"),
                });
            }
        }

        let list = ObservableList::from_items(items);
        let inner = Arc::new(KeyedInner {
            key_fn,
            index: Mutex::new(index),
            list: list.downgrade(),
            _sub: Mutex::new(None),
        });

        let weak: Weak<KeyedInner<K, T>> = Arc::downgrade(&inner);
        let sub = list.on_collection_changed(move |event| {
            if let Some(inner) = weak.upgrade() {
                apply_to_index(&inner, event);
            }
        });
        *inner._sub.lock().expect("keyed sub slot poisoned") = Some(sub);

        Ok(KeyedList { list, inner })
    }

    /// The key of an item, per this list's selector.
    pub fn key_of(&self, item: &T) -> K {
        (self.inner.key_fn)(item)
    }

    /// Whether an item with `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.lock_index().contains_key(key)
    }

    /// The index of the item with `key`, if present.
    pub fn index_of_key(&self, key: &K) -> Option<usize> {
        self.lock_index().get(key).copied()
    }

    /// The item with `key`, if present.
    pub fn try_get(&self, key: &K) -> Option<T> {
        let index = self.index_of_key(key)?;
        self.list.get(index)
    }

    /// The item with `key`, or a `KeyNotFound` error.
    pub fn get_value(&self, key: &K) -> crate::Result<T> {
        self.try_get(key).ok_or_else(|| {
            CollectionError::KeyNotFound {
                key: format!("{key:?}"),
            }
            .into()
        })
    }

    /// Snapshot of the keys, in list order.
    pub fn keys(&self) -> Vec<K> {
        self.list
            .items()
            .iter()
            .map(|item| self.key_of(item))
            .collect()
    }

    /// Append an item; fails when its key is already present.
    pub fn add(&self, item: T) -> crate::Result<()> {
        let key = self.key_of(&item);
        if self.contains_key(&key) {
            return Err(CollectionError::DuplicateKey {
                key: format!("{key:?}"),
            }
            .into());
        }
        self.list.add(item);
        Ok(())
    }

    /// Replace the item with the same key, or append when the key is new.
    /// Returns the replaced item, if any.
    pub fn add_or_update(&self, item: T) -> crate::Result<Option<T>> {
        let key = self.key_of(&item);
        match self.index_of_key(&key) {
            Some(index) => Ok(Some(self.list.set(index, item)?)),
            None => {
                self.list.add(item);
                Ok(None)
            }
        }
    }

    /// Insert an item at an explicit index; fails when its key is already present.
    pub fn insert(&self, index: usize, item: T) -> crate::Result<()> {
        let key = self.key_of(&item);
        if self.contains_key(&key) {
            return Err(CollectionError::DuplicateKey {
                key: format!("{key:?}"),
            }
            .into());
        }
        self.list.insert(index, item)
    }

    /// Replace the item at `index`; the new item's key must be absent or owned by
    /// that same position.
    pub fn set(&self, index: usize, item: T) -> crate::Result<T> {
        let key = self.key_of(&item);
        if let Some(existing) = self.index_of_key(&key)
            && existing != index
        {
            return Err(CollectionError::DuplicateKey {
                key: format!("{key:?}"),
            }
            .into());
        }
        self.list.set(index, item)
    }

    /// Remove the item with `key`, returning it when present.
    pub fn remove_key(&self, key: &K) -> Option<T> {
        let index = self.index_of_key(key)?;
        self.list.remove_at(index).ok()
    }

    /// Replace the contents wholesale. Fails (without mutating) on duplicate keys.
    pub fn reset(&self, items: impl IntoIterator<Item = T>) -> crate::Result<()> {
        let items: Vec<T> = items.into_iter().collect();
        let mut seen: HashMap<K, usize> = HashMap::new();
        for (position, item) in items.iter().enumerate() {
            let key = self.key_of(item);
            if seen.insert(key.clone(), position).is_some() {
                return Err(CollectionError::DuplicateKey {
                    key: format!("{key:?}"),
                }
                .into());
            }
        }
        self.list.reset(items);
        Ok(())
    }

    /// Remove every item.
    pub fn clear(&self) {
        self.list.clear();
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Whether the list holds no items.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Snapshot of the items.
    pub fn items(&self) -> Vec<T> {
        self.list.items()
    }

    /// The item at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<T> {
        self.list.get(index)
    }

    /// Sort with an explicit comparator; the key index follows.
    pub fn sort_by(
        &self,
        compare: impl Fn(&T, &T) -> std::cmp::Ordering + Send + Sync + 'static,
        persist: bool,
    ) {
        self.list.sort_by(compare, persist);
    }

    /// Subscribe to structural change events.
    pub fn on_collection_changed(
        &self,
        handler: impl Fn(&CollectionEvent<T>) + Send + Sync + 'static,
    ) -> Subscription {
        self.list.on_collection_changed(handler)
    }

    /// The hot stream of structural changes.
    pub fn collection_changes(&self) -> impl Stream<Item = CollectionEvent<T>> + Send + use<K, T> {
        self.list.collection_changes()
    }

    /// Subscribe to collection-property changes.
    pub fn on_property_changed(
        &self,
        handler: impl Fn(&CollectionPropertyChanged) + Send + Sync + 'static,
    ) -> Subscription {
        self.list.on_property_changed(handler)
    }

    /// Subscribe to property changes of contained items.
    pub fn on_items_changed(
        &self,
        handler: impl Fn(&ItemChanged<T>) + Send + Sync + 'static,
    ) -> crate::Result<Subscription> {
        self.list.on_items_changed(handler)
    }

    /// The hot stream of contained-item property changes.
    pub fn items_changes(
        &self,
    ) -> crate::Result<impl Stream<Item = ItemChanged<T>> + Send + use<K, T>> {
        self.list.items_changes()
    }

    pub(crate) fn as_list(&self) -> &ObservableList<T> {
        &self.list
    }

    fn lock_index(&self) -> std::sync::MutexGuard<'_, HashMap<K, usize>> {
        self.inner.index.lock().expect("key index poisoned")
    }
}

/// Keep `key → index` exact across a structural change. Incremental for adds,
/// removes, and replaces; rebuilt from the list for moves, resets, and sorts.
fn apply_to_index<K: Key, T: Item>(inner: &Arc<KeyedInner<K, T>>, event: &CollectionEvent<T>) {
    let mut index = inner.index.lock().expect("key index poisoned");
    match event {
        CollectionEvent::Add { index: at, items } => {
            for position in index.values_mut() {
                if *position >= *at {
                    *position += items.len();
                }
            }
            for (offset, item) in items.iter().enumerate() {
                index.insert((inner.key_fn)(item), at + offset);
            }
        }
        CollectionEvent::Remove { index: at, items } => {
            for item in items {
                index.remove(&(inner.key_fn)(item));
            }
            for position in index.values_mut() {
                if *position > *at {
                    *position -= items.len();
                }
            }
        }
        CollectionEvent::Replace {
            index: at,
            old,
            new,
        } => {
            index.remove(&(inner.key_fn)(old));
            index.insert((inner.key_fn)(new), *at);
        }
        CollectionEvent::Move { .. } | CollectionEvent::Reset => {
            index.clear();
            if let Some(list) = inner.list.upgrade() {
                for (position, item) in list.items().iter().enumerate() {
                    index.insert((inner.key_fn)(item), position);
                }
            }
        }
    }
}

impl<K: Key, T: Item + fmt::Debug> fmt::Debug for KeyedList<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedList")
            .field("items", &self.list.items())
            .finish()
    }
}
