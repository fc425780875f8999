//! The tracked keyed list: original-snapshot accounting compared by key.
//!
//! The baseline is a `key → value` snapshot captured lazily, kept as a vector of
//! entries in capture order so rollback restores a deterministic sequence. Where the
//! tracked list diffs positionally, this variant diffs by key: keys present now but
//! not in the baseline are `Add`, keys only in the baseline are `Remove`, and common
//! keys whose tracked item no longer matches its baseline (or whose plain value
//! differs) are `Change`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::Stream;

use super::{
    CollectionError, CollectionEvent, CollectionPropertyChanged, Item, ItemChange, ItemChanged,
    Key, KeyedList, matches_baseline,
};
use crate::constants::IS_CHANGED;
use crate::notify::Subscription;

pub(crate) struct TrackedKeyedInner<K: Key, T: Item> {
    state: Mutex<TrackedKeyedState<K, T>>,
    _item_sub: Mutex<Option<Subscription>>,
}

struct TrackedKeyedState<K, T> {
    /// Captured baseline in capture order; `None` until the first out-of-init mutation.
    original: Option<Vec<(K, T)>>,
    is_changed: bool,
    init_depth: u32,
    suppress_item_tracking: bool,
}

/// A keyed observable list that tracks divergence from a lazily captured baseline,
/// compared by key. Cloning clones the handle.
pub struct TrackedKeyedList<K: Key, T: Item> {
    keyed: KeyedList<K, T>,
    inner: Arc<TrackedKeyedInner<K, T>>,
}

impl<K: Key, T: Item> Clone for TrackedKeyedList<K, T> {
    fn clone(&self) -> Self {
        TrackedKeyedList {
            keyed: self.keyed.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<K: Key, T: Item> TrackedKeyedList<K, T> {
    /// Create an empty tracked keyed list with the given key selector.
    pub fn new(key_fn: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        Self::build(KeyedList::new(key_fn), false)
    }

    /// Create a tracked keyed list seeded from an iterable. Fails on duplicate keys.
    pub fn from_items(
        key_fn: impl Fn(&T) -> K + Send + Sync + 'static,
        items: impl IntoIterator<Item = T>,
    ) -> crate::Result<Self> {
        Ok(Self::build(KeyedList::from_items(key_fn, items)?, false))
    }

    /// As [`TrackedKeyedList::new`], but without attaching to trackable items.
    pub fn with_suppressed_item_tracking(key_fn: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        Self::build(KeyedList::new(key_fn), true)
    }

    fn build(keyed: KeyedList<K, T>, suppress_item_tracking: bool) -> Self {
        let inner = Arc::new(TrackedKeyedInner {
            state: Mutex::new(TrackedKeyedState {
                original: None,
                is_changed: false,
                init_depth: 0,
                suppress_item_tracking,
            }),
            _item_sub: Mutex::new(None),
        });

        let tracked = TrackedKeyedList { keyed, inner };
        if T::OBSERVABLE && !suppress_item_tracking {
            let weak: Weak<TrackedKeyedInner<K, T>> = Arc::downgrade(&tracked.inner);
            let keyed = tracked.keyed.clone();
            let sub = tracked
                .keyed
                .on_items_changed(move |event: &ItemChanged<T>| {
                    if event.property == IS_CHANGED
                        && let Some(inner) = weak.upgrade()
                    {
                        recompute_changed(&inner, &keyed);
                    }
                })
                .expect("observable item type supports the item change stream");
            *tracked
                .inner
                ._item_sub
                .lock()
                .expect("item sub slot poisoned") = Some(sub);
        }
        tracked
    }

    fn lock_state(&self) -> MutexGuard<'_, TrackedKeyedState<K, T>> {
        self.inner
            .state
            .lock()
            .expect("tracked keyed state poisoned")
    }

    // ---- tracking state ------------------------------------------------------------

    /// Whether the collection differs from its baseline.
    pub fn is_changed(&self) -> bool {
        self.lock_state().is_changed
    }

    /// Whether an initialization scope is live.
    pub fn is_initializing(&self) -> bool {
        self.lock_state().init_depth > 0
    }

    /// The captured baseline entries, in capture order.
    pub fn original_items(&self) -> Option<Vec<(K, T)>> {
        self.lock_state().original.clone()
    }

    /// Enter an initialization scope. Re-entrant.
    pub fn begin_init(&self) {
        self.lock_state().init_depth += 1;
    }

    /// Leave an initialization scope; leaving the outermost scope re-evaluates the
    /// changed summary.
    pub fn end_init(&self) -> crate::Result<()> {
        {
            let mut state = self.lock_state();
            if state.init_depth == 0 {
                return Err(CollectionError::InitNotStarted.into());
            }
            state.init_depth -= 1;
            if state.init_depth > 0 {
                return Ok(());
            }
        }
        recompute_changed(&self.inner, &self.keyed);
        Ok(())
    }

    /// Compare against `other` as `key → value` maps: equal sizes, every key present
    /// on both sides, every common entry matching its baseline.
    pub fn original_equals(&self, other: &[T]) -> bool {
        let baseline = self.baseline_entries();
        map_matches(&self.keyed, &baseline, other)
    }

    /// Commit: the current contents become the baseline; tracked items accept
    /// recursively; `is_changed` clears.
    pub fn accept_changes(&self) -> crate::Result<()> {
        let to_accept = {
            let mut state = self.lock_state();
            if state.init_depth > 0 {
                return Err(CollectionError::OperationWhileInitializing {
                    operation: "accept_changes",
                }
                .into());
            }
            state.original = None;
            if T::OBSERVABLE && !state.suppress_item_tracking {
                tracked_models(&self.keyed.items())
            } else {
                Vec::new()
            }
        };

        for model in to_accept {
            model.accept_changes()?;
        }
        recompute_changed(&self.inner, &self.keyed);
        Ok(())
    }

    /// Roll back: tracked items reject recursively, the captured baseline (if any) is
    /// restored, and `is_changed` clears.
    pub fn reject_changes(&self) -> crate::Result<()> {
        let (to_reject, original) = {
            let mut state = self.lock_state();
            if state.init_depth > 0 {
                return Err(CollectionError::OperationWhileInitializing {
                    operation: "reject_changes",
                }
                .into());
            }
            let original = state.original.take();
            let source: Vec<T> = match &original {
                Some(entries) => entries.iter().map(|(_, item)| item.clone()).collect(),
                None => self.keyed.items(),
            };
            let to_reject = if T::OBSERVABLE && !state.suppress_item_tracking {
                tracked_models(&source)
            } else {
                Vec::new()
            };
            (to_reject, original)
        };

        for model in to_reject {
            model.reject_changes()?;
        }
        if let Some(entries) = original {
            self.keyed
                .reset(entries.into_iter().map(|(_, item)| item))?;
        }
        recompute_changed(&self.inner, &self.keyed);
        Ok(())
    }

    /// Replace the contents. With `initialize` the new items become the baseline.
    /// Fails (without mutating) on duplicate keys.
    pub fn reset(&self, items: impl IntoIterator<Item = T>, initialize: bool) -> crate::Result<()> {
        if initialize {
            {
                let mut state = self.lock_state();
                state.init_depth += 1;
                state.original = None;
            }
            let result = self.keyed.reset(items);
            {
                let mut state = self.lock_state();
                state.init_depth -= 1;
            }
            recompute_changed(&self.inner, &self.keyed);
            result
        } else {
            let initializing = self.prepare();
            self.keyed.reset(items)?;
            if initializing {
                let entries = self.current_entries();
                self.mirror(|original| *original = entries);
            }
            recompute_changed(&self.inner, &self.keyed);
            Ok(())
        }
    }

    /// The difference between the current contents and the baseline, compared by key.
    pub fn get_changed_items(&self) -> Vec<ItemChange<T>> {
        let items = self.keyed.items();
        let original = self.lock_state().original.clone();

        let Some(original) = original else {
            return items
                .iter()
                .filter(|item| !matches_baseline(*item, item))
                .map(|item| ItemChange::Changed {
                    current: item.clone(),
                    original: None,
                })
                .collect();
        };

        let mut changes = Vec::new();
        for item in &items {
            let key = self.keyed.key_of(item);
            match original.iter().find(|(k, _)| *k == key) {
                None => changes.push(ItemChange::Added(item.clone())),
                Some((_, baseline)) => {
                    if !matches_baseline(baseline, item) {
                        changes.push(ItemChange::Changed {
                            current: item.clone(),
                            original: Some(baseline.clone()),
                        });
                    }
                }
            }
        }
        for (key, baseline) in &original {
            if !self.keyed.contains_key(key) {
                changes.push(ItemChange::Removed(baseline.clone()));
            }
        }
        changes
    }

    /// The single change for `key`, if it has one.
    pub fn try_get_change(&self, key: &K) -> Option<ItemChange<T>> {
        let current = self.keyed.try_get(key);
        let original = self.lock_state().original.clone();

        match original {
            None => match current {
                Some(item) if !matches_baseline(&item, &item) => Some(ItemChange::Changed {
                    current: item,
                    original: None,
                }),
                _ => None,
            },
            Some(entries) => {
                let baseline = entries
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, item)| item.clone());
                match (baseline, current) {
                    (None, Some(item)) => Some(ItemChange::Added(item)),
                    (Some(item), None) => Some(ItemChange::Removed(item)),
                    (Some(baseline), Some(item)) => {
                        if matches_baseline(&baseline, &item) {
                            None
                        } else {
                            Some(ItemChange::Changed {
                                current: item,
                                original: Some(baseline),
                            })
                        }
                    }
                    (None, None) => None,
                }
            }
        }
    }

    /// Whether `key`'s value differs from the baseline.
    pub fn is_value_changed(&self, key: &K) -> bool {
        self.try_get_change(key).is_some()
    }

    /// Edit the captured baseline in place: the entry for `item`'s key takes `item`.
    /// Captures the baseline first if none was captured yet. The changed summary is
    /// re-evaluated afterwards.
    pub fn add_or_update_original(&self, item: T) {
        let key = self.keyed.key_of(&item);
        {
            let mut state = self.lock_state();
            if state.original.is_none() {
                state.original = Some(
                    self.keyed
                        .items()
                        .iter()
                        .map(|item| (self.keyed.key_of(item), item.clone()))
                        .collect(),
                );
            }
            let original = state.original.as_mut().expect("baseline just captured");
            match original.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = item,
                None => original.push((key, item)),
            }
        }
        recompute_changed(&self.inner, &self.keyed);
    }

    // ---- mutation ------------------------------------------------------------------

    /// Append an item; fails when its key is already present.
    pub fn add(&self, item: T) -> crate::Result<()> {
        self.prepare();
        self.keyed.add(item.clone())?;
        self.mirror_if_initializing(|original, keyed| {
            original.push((keyed.key_of(&item), item.clone()));
        });
        recompute_changed(&self.inner, &self.keyed);
        Ok(())
    }

    /// Replace the item with the same key, or append when the key is new.
    pub fn add_or_update(&self, item: T) -> crate::Result<Option<T>> {
        self.prepare();
        let replaced = self.keyed.add_or_update(item.clone())?;
        self.mirror_if_initializing(|original, keyed| {
            let key = keyed.key_of(&item);
            match original.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = item.clone(),
                None => original.push((key, item.clone())),
            }
        });
        recompute_changed(&self.inner, &self.keyed);
        Ok(replaced)
    }

    /// Remove the item with `key`, returning it when present.
    pub fn remove_key(&self, key: &K) -> Option<T> {
        self.prepare();
        let removed = self.keyed.remove_key(key);
        if removed.is_some() {
            self.mirror_if_initializing(|original, _| {
                original.retain(|(k, _)| k != key);
            });
        }
        recompute_changed(&self.inner, &self.keyed);
        removed
    }

    /// Remove every item.
    pub fn clear(&self) {
        self.prepare();
        self.keyed.clear();
        self.mirror_if_initializing(|original, _| original.clear());
        recompute_changed(&self.inner, &self.keyed);
    }

    fn prepare(&self) -> bool {
        let mut state = self.lock_state();
        if state.init_depth > 0 {
            return true;
        }
        if state.original.is_none() {
            state.original = Some(self.current_entries());
        }
        false
    }

    fn mirror(&self, f: impl FnOnce(&mut Vec<(K, T)>)) {
        let mut state = self.lock_state();
        if let Some(original) = state.original.as_mut() {
            f(original);
        }
    }

    fn mirror_if_initializing(&self, f: impl FnOnce(&mut Vec<(K, T)>, &KeyedList<K, T>)) {
        let mut state = self.lock_state();
        if state.init_depth == 0 {
            return;
        }
        if let Some(original) = state.original.as_mut() {
            f(original, &self.keyed);
        }
    }

    fn current_entries(&self) -> Vec<(K, T)> {
        self.keyed
            .items()
            .iter()
            .map(|item| (self.keyed.key_of(item), item.clone()))
            .collect()
    }

    fn baseline_entries(&self) -> Vec<(K, T)> {
        let original = self.lock_state().original.clone();
        match original {
            Some(entries) => entries,
            None => self.current_entries(),
        }
    }

    // ---- reading & events ----------------------------------------------------------

    /// Whether an item with `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.keyed.contains_key(key)
    }

    /// The index of the item with `key`, if present.
    pub fn index_of_key(&self, key: &K) -> Option<usize> {
        self.keyed.index_of_key(key)
    }

    /// The item with `key`, if present.
    pub fn try_get(&self, key: &K) -> Option<T> {
        self.keyed.try_get(key)
    }

    /// The item with `key`, or a `KeyNotFound` error.
    pub fn get_value(&self, key: &K) -> crate::Result<T> {
        self.keyed.get_value(key)
    }

    /// The key of an item, per this list's selector.
    pub fn key_of(&self, item: &T) -> K {
        self.keyed.key_of(item)
    }

    /// Snapshot of the keys, in list order.
    pub fn keys(&self) -> Vec<K> {
        self.keyed.keys()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.keyed.len()
    }

    /// Whether the list holds no items.
    pub fn is_empty(&self) -> bool {
        self.keyed.is_empty()
    }

    /// Snapshot of the items.
    pub fn items(&self) -> Vec<T> {
        self.keyed.items()
    }

    /// The item at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<T> {
        self.keyed.get(index)
    }

    /// Subscribe to structural change events.
    pub fn on_collection_changed(
        &self,
        handler: impl Fn(&CollectionEvent<T>) + Send + Sync + 'static,
    ) -> Subscription {
        self.keyed.on_collection_changed(handler)
    }

    /// The hot stream of structural changes.
    pub fn collection_changes(&self) -> impl Stream<Item = CollectionEvent<T>> + Send + use<K, T> {
        self.keyed.collection_changes()
    }

    /// Subscribe to collection-property changes, including `is_changed` toggles.
    pub fn on_property_changed(
        &self,
        handler: impl Fn(&CollectionPropertyChanged) + Send + Sync + 'static,
    ) -> Subscription {
        self.keyed.on_property_changed(handler)
    }

    /// Subscribe to property changes of contained items.
    pub fn on_items_changed(
        &self,
        handler: impl Fn(&ItemChanged<T>) + Send + Sync + 'static,
    ) -> crate::Result<Subscription> {
        self.keyed.on_items_changed(handler)
    }
}

/// Re-evaluate the changed summary against the baseline; raise on toggle.
fn recompute_changed<K: Key, T: Item>(
    inner: &Arc<TrackedKeyedInner<K, T>>,
    keyed: &KeyedList<K, T>,
) {
    let toggled = {
        let mut state = inner
            .state
            .lock()
            .expect("tracked keyed state poisoned");
        if state.init_depth > 0 {
            return;
        }
        let items = keyed.items();
        let baseline: Vec<(K, T)> = match &state.original {
            Some(entries) => entries.clone(),
            None => items
                .iter()
                .map(|item| (keyed.key_of(item), item.clone()))
                .collect(),
        };
        let now_changed = !map_matches(keyed, &baseline, &items);
        if state.is_changed == now_changed {
            false
        } else {
            state.is_changed = now_changed;
            true
        }
    };
    if toggled {
        keyed.as_list().raise_property(IS_CHANGED);
    }
}

/// Map comparison: equal sizes and every baseline entry matched by the current item
/// with the same key.
fn map_matches<K: Key, T: Item>(keyed: &KeyedList<K, T>, baseline: &[(K, T)], other: &[T]) -> bool {
    if baseline.len() != other.len() {
        return false;
    }
    baseline.iter().all(|(key, original)| {
        other
            .iter()
            .find(|item| keyed.key_of(item) == *key)
            .is_some_and(|item| matches_baseline(original, item))
    })
}

fn tracked_models<T: Item>(items: &[T]) -> Vec<crate::Model> {
    items
        .iter()
        .filter_map(|item| item.as_model())
        .filter(|model| model.is_tracked())
        .cloned()
        .collect()
}

impl<K: Key, T: Item + fmt::Debug> fmt::Debug for TrackedKeyedList<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedKeyedList")
            .field("items", &self.keyed.items())
            .field("is_changed", &self.is_changed())
            .finish()
    }
}
