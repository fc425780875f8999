//! The ordered observable container.
//!
//! Every mutation follows the same discipline as model writes: the structural change
//! is applied under the state lock while the events to raise are collected, then the
//! lock is released and the events are delivered — the structural
//! [`CollectionEvent`]s first, then the collection-property changes (`count`, `item`,
//! `first`, `last`, `is_empty`) that actually changed, computed by diffing a cheap
//! before/after snapshot.
//!
//! When a persisted sort is set, `add` inserts at the stable binary-search position
//! (ties land after existing equals, preserving insertion order) and `add_range` adds
//! one-by-one so each item is placed in sorted position.

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::Stream;
use tracing::error;

use super::{CollectionError, CollectionEvent, CollectionPropertyChanged, Item, ItemChanged};
use crate::constants::{COUNT, FIRST, IS_EMPTY, ITEM, LAST};
use crate::model::ModelChanged;
use crate::notify::{Notifier, Subscription, WeakHandler};

type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

pub(crate) struct ListInner<T: Item> {
    state: Mutex<ListState<T>>,
    events: Notifier<CollectionEvent<T>>,
    props: Notifier<CollectionPropertyChanged>,
    item_events: Notifier<ItemChanged<T>>,
}

struct ListState<T: Item> {
    items: Vec<T>,
    /// Per-item property subscriptions, in lockstep with `items`.
    /// Maintained only for observable item types.
    item_subs: Vec<Option<Subscription>>,
    /// Comparator retained across mutations so `add` keeps sorted order.
    sort: Option<Comparator<T>>,
}

struct PropSnapshot<T> {
    len: usize,
    first: Option<T>,
    last: Option<T>,
}

/// An ordered collection that raises structural change events. Cloning clones the
/// handle.
pub struct ObservableList<T: Item> {
    inner: Arc<ListInner<T>>,
}

impl<T: Item> Clone for ObservableList<T> {
    fn clone(&self) -> Self {
        ObservableList {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Item> Default for ObservableList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> ObservableList<T> {
    /// Create an empty list.
    pub fn new() -> Self {
        ObservableList {
            inner: Arc::new(ListInner {
                state: Mutex::new(ListState {
                    items: Vec::new(),
                    item_subs: Vec::new(),
                    sort: None,
                }),
                events: Notifier::new(),
                props: Notifier::new(),
                item_events: Notifier::new(),
            }),
        }
    }

    /// Create a list seeded from an iterable.
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        let list = Self::new();
        {
            let mut state = list.lock_state();
            state.items = items.into_iter().collect();
            if T::OBSERVABLE {
                let subs = list.make_subs(&state.items);
                state.item_subs = subs;
            }
        }
        list
    }

    fn lock_state(&self) -> MutexGuard<'_, ListState<T>> {
        self.inner.state.lock().expect("list state poisoned")
    }

    /// Handle identity.
    pub fn ptr_eq(&self, other: &ObservableList<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakList<T> {
        WeakList {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ---- reading -------------------------------------------------------------------

    /// Number of items.
    pub fn len(&self) -> usize {
        self.lock_state().items.len()
    }

    /// Whether the list holds no items.
    pub fn is_empty(&self) -> bool {
        self.lock_state().items.is_empty()
    }

    /// Snapshot of the items.
    pub fn items(&self) -> Vec<T> {
        self.lock_state().items.clone()
    }

    /// The item at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<T> {
        self.lock_state().items.get(index).cloned()
    }

    /// The first item, if any.
    pub fn first(&self) -> Option<T> {
        self.lock_state().items.first().cloned()
    }

    /// The last item, if any.
    pub fn last(&self) -> Option<T> {
        self.lock_state().items.last().cloned()
    }

    /// Whether any item structurally equals `item`.
    pub fn contains(&self, item: &T) -> bool {
        self.lock_state().items.iter().any(|x| x.item_eq(item))
    }

    /// Index of the first item structurally equal to `item`.
    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.lock_state().items.iter().position(|x| x.item_eq(item))
    }

    /// Index of the item identical to `item`.
    pub fn index_of_identical(&self, item: &T) -> Option<usize> {
        self.lock_state()
            .items
            .iter()
            .position(|x| x.same_identity(item))
    }

    /// Whether a persisted sort comparator is set.
    pub fn has_persisted_sort(&self) -> bool {
        self.lock_state().sort.is_some()
    }

    // ---- mutation ------------------------------------------------------------------

    /// Append an item, or insert it at its stable sorted position when a persisted
    /// sort is set.
    pub fn add(&self, item: T) {
        self.add_indexed(item);
    }

    /// As [`ObservableList::add`], returning the index the item landed at.
    pub(crate) fn add_indexed(&self, item: T) -> usize {
        self.apply(|state| {
            let index = match &state.sort {
                Some(cmp) => sorted_insert_position(&state.items, &item, cmp),
                None => state.items.len(),
            };
            state.items.insert(index, item.clone());
            (index, vec![CollectionEvent::Add {
                index,
                items: vec![item],
            }])
        })
    }

    /// Add every item of an iterable. Under a persisted sort, items are added
    /// one-by-one so each lands at its sorted position.
    pub fn add_range(&self, items: impl IntoIterator<Item = T>) {
        if self.has_persisted_sort() {
            for item in items {
                self.add(item);
            }
            return;
        }
        let items: Vec<T> = items.into_iter().collect();
        if items.is_empty() {
            return;
        }
        self.apply(|state| {
            let index = state.items.len();
            state.items.extend(items.iter().cloned());
            ((), vec![CollectionEvent::Add { index, items }])
        });
    }

    /// Insert an item at an explicit index.
    pub fn insert(&self, index: usize, item: T) -> crate::Result<()> {
        self.insert_range(index, [item])
    }

    /// Insert several items at an explicit index.
    pub fn insert_range(
        &self,
        index: usize,
        items: impl IntoIterator<Item = T>,
    ) -> crate::Result<()> {
        let items: Vec<T> = items.into_iter().collect();
        self.try_apply(|state| {
            if index > state.items.len() {
                return Err(CollectionError::IndexOutOfRange {
                    index,
                    len: state.items.len(),
                });
            }
            if items.is_empty() {
                return Ok(((), Vec::new()));
            }
            state.items.splice(index..index, items.iter().cloned());
            Ok(((), vec![CollectionEvent::Add { index, items }]))
        })
    }

    /// Replace the item at `index`.
    pub fn set(&self, index: usize, item: T) -> crate::Result<T> {
        self.try_apply(|state| {
            if index >= state.items.len() {
                return Err(CollectionError::IndexOutOfRange {
                    index,
                    len: state.items.len(),
                });
            }
            let old = std::mem::replace(&mut state.items[index], item.clone());
            Ok((old.clone(), vec![CollectionEvent::Replace {
                index,
                old,
                new: item,
            }]))
        })
    }

    /// Remove the first item structurally equal to `item`.
    pub fn remove(&self, item: &T) -> bool {
        let index = self.index_of(item);
        match index {
            Some(index) => self.remove_at(index).is_ok(),
            None => false,
        }
    }

    /// Remove the item at `index`.
    pub fn remove_at(&self, index: usize) -> crate::Result<T> {
        self.try_apply(|state| {
            if index >= state.items.len() {
                return Err(CollectionError::IndexOutOfRange {
                    index,
                    len: state.items.len(),
                });
            }
            let item = state.items.remove(index);
            Ok((item.clone(), vec![CollectionEvent::Remove {
                index,
                items: vec![item],
            }]))
        })
    }

    pub(crate) fn remove_range(&self, index: usize, len: usize) -> crate::Result<Vec<T>> {
        self.try_apply(|state| {
            if index + len > state.items.len() {
                return Err(CollectionError::IndexOutOfRange {
                    index: index + len,
                    len: state.items.len(),
                });
            }
            let items: Vec<T> = state.items.drain(index..index + len).collect();
            if items.is_empty() {
                return Ok((Vec::new(), Vec::new()));
            }
            Ok((items.clone(), vec![CollectionEvent::Remove { index, items }]))
        })
    }

    /// Remove every item matching the predicate, iterating high-to-low and raising
    /// one `Remove` per match. Returns the number of removed items.
    pub fn remove_all(&self, predicate: impl Fn(&T) -> bool) -> usize {
        let matches: Vec<usize> = {
            let state = self.lock_state();
            state
                .items
                .iter()
                .enumerate()
                .filter(|(_, item)| predicate(item))
                .map(|(index, _)| index)
                .collect()
        };
        let mut removed = 0;
        for index in matches.into_iter().rev() {
            if self.remove_at(index).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    /// Move the item at `from` to `to`.
    pub fn move_item(&self, from: usize, to: usize) -> crate::Result<()> {
        self.try_apply(|state| {
            let len = state.items.len();
            if from >= len {
                return Err(CollectionError::IndexOutOfRange { index: from, len });
            }
            if to >= len {
                return Err(CollectionError::IndexOutOfRange { index: to, len });
            }
            if from == to {
                return Ok(((), Vec::new()));
            }
            let item = state.items.remove(from);
            state.items.insert(to, item.clone());
            Ok(((), vec![CollectionEvent::Move { from, to, item }]))
        })
    }

    /// Remove every item.
    pub fn clear(&self) {
        self.apply(|state| {
            if state.items.is_empty() {
                return ((), Vec::new());
            }
            state.items.clear();
            ((), vec![CollectionEvent::Reset])
        });
    }

    /// Replace the contents wholesale.
    pub fn reset(&self, items: impl IntoIterator<Item = T>) {
        let items: Vec<T> = items.into_iter().collect();
        self.apply(|state| {
            state.items = items;
            ((), vec![CollectionEvent::Reset])
        });
    }

    /// Sort with an explicit comparator; `persist` retains it so later `add`s keep
    /// the order. The sort is stable: equal items keep their relative order.
    pub fn sort_by(
        &self,
        compare: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static,
        persist: bool,
    ) {
        let compare: Comparator<T> = Arc::new(compare);
        self.apply(|state| {
            state.items.sort_by(|a, b| compare(a, b));
            if persist {
                state.sort = Some(compare.clone());
            }
            ((), vec![CollectionEvent::Reset])
        });
    }

    /// Sort by a key function; `persist` as in [`ObservableList::sort_by`].
    pub fn sort_by_key<K: Ord>(&self, key: impl Fn(&T) -> K + Send + Sync + 'static, persist: bool) {
        self.sort_by(move |a, b| key(a).cmp(&key(b)), persist);
    }

    /// Re-place a single item after its sort key changed; raises a `Move` when the
    /// position actually changes. Returns whether it moved. No-op without a
    /// persisted sort.
    pub fn update_sort_position(&self, item: &T) -> crate::Result<bool> {
        self.try_apply(|state| {
            let Some(cmp) = state.sort.clone() else {
                return Ok((false, Vec::new()));
            };
            let Some(from) = state.items.iter().position(|x| x.same_identity(item)) else {
                return Err(CollectionError::IndexOutOfRange {
                    index: state.items.len(),
                    len: state.items.len(),
                });
            };
            let moved = state.items.remove(from);
            let to = sorted_insert_position(&state.items, &moved, &cmp);
            state.items.insert(to, moved.clone());
            if from == to {
                return Ok((false, Vec::new()));
            }
            Ok((true, vec![CollectionEvent::Move {
                from,
                to,
                item: moved,
            }]))
        })
    }

    // ---- events --------------------------------------------------------------------

    /// Subscribe to structural change events.
    pub fn on_collection_changed(
        &self,
        handler: impl Fn(&CollectionEvent<T>) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.events.subscribe(handler)
    }

    /// Subscribe a weakly held structural-change handler.
    pub fn on_collection_changed_weak(
        &self,
        handler: WeakHandler<CollectionEvent<T>>,
    ) -> Subscription {
        self.inner.events.subscribe_weak(handler)
    }

    /// The hot stream of structural changes.
    pub fn collection_changes(&self) -> impl Stream<Item = CollectionEvent<T>> + Send + use<T> {
        self.inner.events.subscribe_stream()
    }

    /// Subscribe to collection-property changes (`count`, `item`, `first`, `last`,
    /// `is_empty`, and `is_changed` on tracked variants).
    pub fn on_property_changed(
        &self,
        handler: impl Fn(&CollectionPropertyChanged) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.props.subscribe(handler)
    }

    /// The hot stream of collection-property changes.
    pub fn property_changes(&self) -> impl Stream<Item = CollectionPropertyChanged> + Send + use<T> {
        self.inner.props.subscribe_stream()
    }

    /// Subscribe to property changes of contained items. Not supported when the item
    /// type is not observable.
    pub fn on_items_changed(
        &self,
        handler: impl Fn(&ItemChanged<T>) + Send + Sync + 'static,
    ) -> crate::Result<Subscription> {
        self.require_observable_items()?;
        Ok(self.inner.item_events.subscribe(handler))
    }

    /// The hot stream of contained-item property changes. Not supported when the item
    /// type is not observable.
    pub fn items_changes(
        &self,
    ) -> crate::Result<impl Stream<Item = ItemChanged<T>> + Send + use<T>> {
        self.require_observable_items()?;
        Ok(self.inner.item_events.subscribe_stream())
    }

    fn require_observable_items(&self) -> Result<(), CollectionError> {
        if T::OBSERVABLE {
            Ok(())
        } else {
            Err(CollectionError::ItemsNotObservable {
                item_type: T::item_type(),
            })
        }
    }

    pub(crate) fn raise_property(&self, property: &str) {
        self.inner.props.raise(&CollectionPropertyChanged {
            property: property.to_string(),
        });
    }

    // ---- binding -------------------------------------------------------------------

    /// Mirror this list into an external mutable collection through `selector`.
    ///
    /// Adds, removes, and replaces translate into `add`/`remove` calls on the target.
    /// On `Reset` the target is cleared, restored to the snapshot of items present at
    /// bind time, and then the current items are appended.
    pub fn bind<U, C>(
        &self,
        target: Arc<Mutex<C>>,
        selector: impl Fn(&T) -> U + Send + Sync + 'static,
    ) -> Subscription
    where
        U: Clone + PartialEq + Send + Sync + 'static,
        C: BoundCollection<U> + Send + 'static,
    {
        let bind_snapshot: Vec<U> = {
            let mut guard = target.lock().expect("bind target poisoned");
            let snapshot: Vec<U> = self.items().iter().map(&selector).collect();
            for value in &snapshot {
                guard.add(value.clone());
            }
            snapshot
        };

        let weak = self.downgrade();
        self.inner.events.subscribe(move |event| {
            let mut guard = target.lock().expect("bind target poisoned");
            match event {
                CollectionEvent::Add { items, .. } => {
                    for item in items {
                        guard.add(selector(item));
                    }
                }
                CollectionEvent::Remove { items, .. } => {
                    for item in items {
                        guard.remove(&selector(item));
                    }
                }
                CollectionEvent::Replace { old, new, .. } => {
                    guard.remove(&selector(old));
                    guard.add(selector(new));
                }
                // Plain targets carry no order, so a move is invisible to them.
                CollectionEvent::Move { .. } => {}
                CollectionEvent::Reset => {
                    guard.clear();
                    for value in &bind_snapshot {
                        guard.add(value.clone());
                    }
                    if let Some(list) = weak.upgrade() {
                        for item in list.items() {
                            guard.add(selector(&item));
                        }
                    }
                }
            }
        })
    }

    // ---- internals -----------------------------------------------------------------

    fn apply<R>(&self, f: impl FnOnce(&mut ListState<T>) -> (R, Vec<CollectionEvent<T>>)) -> R {
        match self.try_apply(|state| Ok(f(state))) {
            Ok(result) => result,
            Err(_) => unreachable!("infallible mutation"),
        }
    }

    fn try_apply<R>(
        &self,
        f: impl FnOnce(&mut ListState<T>) -> Result<(R, Vec<CollectionEvent<T>>), CollectionError>,
    ) -> crate::Result<R> {
        let (result, events, props) = {
            let mut state = self.lock_state();
            let before = snapshot_props(&state.items);
            let (result, events) = f(&mut state)?;
            if T::OBSERVABLE {
                for event in &events {
                    self.sync_item_subs(&mut state, event);
                }
            }
            let after = snapshot_props(&state.items);
            let props = if events.is_empty() {
                Vec::new()
            } else {
                diff_props(&before, &after)
            };
            (result, events, props)
        };

        for event in &events {
            self.inner.events.raise(event);
        }
        for property in props {
            self.raise_property(property);
        }
        Ok(result)
    }

    fn sync_item_subs(&self, state: &mut ListState<T>, event: &CollectionEvent<T>) {
        match event {
            CollectionEvent::Add { index, items } => {
                for (offset, item) in items.iter().enumerate() {
                    state
                        .item_subs
                        .insert(index + offset, self.make_item_sub(item));
                }
            }
            CollectionEvent::Remove { index, items } => {
                state.item_subs.drain(*index..*index + items.len());
            }
            CollectionEvent::Replace { index, new, .. } => {
                state.item_subs[*index] = self.make_item_sub(new);
            }
            CollectionEvent::Move { from, to, .. } => {
                let sub = state.item_subs.remove(*from);
                state.item_subs.insert(*to, sub);
            }
            CollectionEvent::Reset => {
                let subs = self.make_subs(&state.items);
                state.item_subs = subs;
            }
        }
    }

    fn make_subs(&self, items: &[T]) -> Vec<Option<Subscription>> {
        items.iter().map(|item| self.make_item_sub(item)).collect()
    }

    fn make_item_sub(&self, item: &T) -> Option<Subscription> {
        let model = item.as_model()?;
        let weak = Arc::downgrade(&self.inner);
        Some(model.on_property_changed(move |event: &ModelChanged| {
            if let Some(inner) = weak.upgrade() {
                ObservableList { inner }.raise_item_changed(event);
            }
        }))
    }

    /// Resolve the contained item that raised and fan its change out.
    fn raise_item_changed(&self, event: &ModelChanged) {
        let item = {
            let state = self.lock_state();
            state
                .items
                .iter()
                .find(|item| {
                    item.as_model()
                        .is_some_and(|model| model.ptr_eq(&event.source))
                })
                .cloned()
        };
        match item {
            Some(item) => self.inner.item_events.raise(&ItemChanged {
                item,
                property: event.property.clone(),
            }),
            // The item was removed between the raise and this delivery.
            None => error!(
                property = event.property,
                "item change arrived for an item no longer contained"
            ),
        }
    }
}

impl<T: Item + Ord> ObservableList<T> {
    /// Sort by the item type's natural order (stable, not persisted).
    pub fn sort(&self) {
        self.sort_by(|a, b| a.cmp(b), false);
    }
}

impl<T: Item> FromIterator<T> for ObservableList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_items(iter)
    }
}

impl<T: Item + fmt::Debug> fmt::Debug for ObservableList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableList")
            .field("items", &self.lock_state().items)
            .finish()
    }
}

/// The stable insertion position for `item`: after every existing item that compares
/// less than or equal to it.
fn sorted_insert_position<T>(items: &[T], item: &T, compare: &Comparator<T>) -> usize {
    items.partition_point(|existing| compare(existing, item) != Ordering::Greater)
}

fn snapshot_props<T: Item>(items: &[T]) -> PropSnapshot<T> {
    PropSnapshot {
        len: items.len(),
        first: items.first().cloned(),
        last: items.last().cloned(),
    }
}

fn diff_props<T: Item>(before: &PropSnapshot<T>, after: &PropSnapshot<T>) -> Vec<&'static str> {
    let mut props = Vec::new();
    if before.len != after.len {
        props.push(COUNT);
    }
    props.push(ITEM);
    if !option_eq(&before.first, &after.first) {
        props.push(FIRST);
    }
    if !option_eq(&before.last, &after.last) {
        props.push(LAST);
    }
    if (before.len == 0) != (after.len == 0) {
        props.push(IS_EMPTY);
    }
    props
}

fn option_eq<T: Item>(a: &Option<T>, b: &Option<T>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.item_eq(b),
        _ => false,
    }
}

/// Weak handle to a list, used by handlers that must not keep their source alive.
pub(crate) struct WeakList<T: Item> {
    inner: Weak<ListInner<T>>,
}

impl<T: Item> Clone for WeakList<T> {
    fn clone(&self) -> Self {
        WeakList {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Item> WeakList<T> {
    pub(crate) fn upgrade(&self) -> Option<ObservableList<T>> {
        self.inner.upgrade().map(|inner| ObservableList { inner })
    }
}

/// An external mutable collection an observable list can be mirrored into.
pub trait BoundCollection<U> {
    /// Append a value.
    fn add(&mut self, value: U);
    /// Remove the first occurrence of `value`.
    fn remove(&mut self, value: &U);
    /// Remove every value.
    fn clear(&mut self);
}

impl<U: PartialEq> BoundCollection<U> for Vec<U> {
    fn add(&mut self, value: U) {
        self.push(value);
    }

    fn remove(&mut self, value: &U) {
        if let Some(index) = self.iter().position(|x| x == value) {
            Vec::remove(self, index);
        }
    }

    fn clear(&mut self) {
        Vec::clear(self);
    }
}
