//! The tracked list: an observable list with original-snapshot accounting.
//!
//! The original is captured lazily — the first structural mutation outside an
//! initialization scope snapshots the current items before applying. During
//! initialization, mutations are mirrored into an already-captured original so the
//! baseline keeps reflecting the committed state. `is_changed` is recomputed against
//! the baseline after every structural mutation and whenever a contained tracked
//! item toggles its own `is_changed`; toggles are raised as an `is_changed`
//! collection-property change.
//!
//! Position is part of identity: moving an item produces two `Change` entries in the
//! change set, one for the moved element and one for the element it displaced.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::Stream;

use super::list::WeakList;
use super::{
    CollectionError, CollectionEvent, CollectionPropertyChanged, Item, ItemChange, ItemChanged,
    ObservableList, matches_baseline,
};
use crate::constants::IS_CHANGED;
use crate::notify::Subscription;

pub(crate) struct TrackedListInner<T: Item> {
    state: Mutex<TrackedState<T>>,
    list: WeakList<T>,
    _item_sub: Mutex<Option<Subscription>>,
}

struct TrackedState<T> {
    /// Captured baseline; `None` until the first out-of-init mutation.
    original: Option<Vec<T>>,
    is_changed: bool,
    init_depth: u32,
    suppress_item_tracking: bool,
}

/// An observable list that tracks divergence from a lazily captured original.
/// Cloning clones the handle.
pub struct TrackedList<T: Item> {
    list: ObservableList<T>,
    inner: Arc<TrackedListInner<T>>,
}

impl<T: Item> Clone for TrackedList<T> {
    fn clone(&self) -> Self {
        TrackedList {
            list: self.list.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T: Item> Default for TrackedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> TrackedList<T> {
    /// Create an empty tracked list.
    pub fn new() -> Self {
        Self::build(Vec::new(), false)
    }

    /// Create a tracked list seeded from an iterable.
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        Self::build(items.into_iter().collect(), false)
    }

    /// Create a tracked list that does not attach to its items even when they are
    /// trackable.
    pub fn with_suppressed_item_tracking(items: impl IntoIterator<Item = T>) -> Self {
        Self::build(items.into_iter().collect(), true)
    }

    fn build(items: Vec<T>, suppress_item_tracking: bool) -> Self {
        let list = ObservableList::from_items(items);
        let inner = Arc::new(TrackedListInner {
            state: Mutex::new(TrackedState {
                original: None,
                is_changed: false,
                init_depth: 0,
                suppress_item_tracking,
            }),
            list: list.downgrade(),
            _item_sub: Mutex::new(None),
        });

        if T::OBSERVABLE && !suppress_item_tracking {
            let weak: Weak<TrackedListInner<T>> = Arc::downgrade(&inner);
            let sub = list
                .on_items_changed(move |event: &ItemChanged<T>| {
                    if event.property == IS_CHANGED
                        && let Some(inner) = weak.upgrade()
                        && let Some(list) = inner.list.upgrade()
                    {
                        recompute_changed(&inner, &list);
                    }
                })
                .expect("observable item type supports the item change stream");
            *inner._item_sub.lock().expect("item sub slot poisoned") = Some(sub);
        }

        TrackedList { list, inner }
    }

    fn lock_state(&self) -> MutexGuard<'_, TrackedState<T>> {
        self.inner.state.lock().expect("tracked list state poisoned")
    }

    /// Handle identity.
    pub fn ptr_eq(&self, other: &TrackedList<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether per-item tracking is active for this collection.
    pub fn is_item_tracking_enabled(&self) -> bool {
        T::OBSERVABLE && !self.lock_state().suppress_item_tracking
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

    /// The captured original items, when an original has been captured.
    pub fn original_items(&self) -> Option<Vec<T>> {
        self.lock_state().original.clone()
    }

    /// Enter an initialization scope: mutations inside it define the baseline rather
    /// than diverging from it. Re-entrant.
    pub fn begin_init(&self) {
        self.lock_state().init_depth += 1;
    }

    /// Leave an initialization scope; on leaving the outermost scope the changed
    /// summary is re-evaluated.
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
        recompute_changed(&self.inner, &self.list);
        Ok(())
    }

    /// Element-wise comparison against the baseline: a tracked item matches when its
    /// originals equal the other side's values, a plain item when it is structurally
    /// equal.
    pub fn original_equals(&self, other: &[T]) -> bool {
        let original = self.lock_state().original.clone();
        let baseline = match original {
            Some(items) => items,
            None => self.list.items(),
        };
        baseline_matches(&baseline, other)
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
                tracked_models(&self.list.items())
            } else {
                Vec::new()
            }
        };

        for model in to_accept {
            model.accept_changes()?;
        }
        recompute_changed(&self.inner, &self.list);
        Ok(())
    }

    /// Roll back: tracked items reject recursively, the captured original (if any) is
    /// restored wholesale, and `is_changed` clears.
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
            let source = match &original {
                Some(items) => items.clone(),
                None => self.list.items(),
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
        if let Some(items) = original {
            self.list.reset(items);
        }
        recompute_changed(&self.inner, &self.list);
        Ok(())
    }

    /// Replace the contents. With `initialize` the new items become the baseline
    /// (any captured original is discarded); without it this is a plain tracked
    /// reset.
    pub fn reset(&self, items: impl IntoIterator<Item = T>, initialize: bool) {
        if initialize {
            {
                let mut state = self.lock_state();
                state.init_depth += 1;
                state.original = None;
            }
            self.list.reset(items);
            {
                let mut state = self.lock_state();
                state.init_depth -= 1;
            }
            recompute_changed(&self.inner, &self.list);
        } else {
            let initializing = self.prepare();
            self.list.reset(items);
            if initializing {
                let current = self.list.items();
                self.mirror(|original| *original = current);
            }
            recompute_changed(&self.inner, &self.list);
        }
    }

    /// The difference between the current contents and the baseline.
    ///
    /// Without a captured original, the set contains one `Change` per tracked item
    /// with pending changes. With one, items are matched positionally by identity:
    /// same-position matches with pending item changes are `Change`, identity matches
    /// at another position are `Change` (position is identity), unmatched current
    /// items are `Add`, and leftover originals are `Remove`.
    pub fn get_changed_items(&self) -> Vec<ItemChange<T>> {
        let items = self.list.items();
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

        let mut matched = vec![false; original.len()];
        let mut changes = Vec::new();

        for (position, item) in items.iter().enumerate() {
            let same_position = original
                .get(position)
                .is_some_and(|o| !matched[position] && o.same_identity(item));
            if same_position {
                matched[position] = true;
                if !matches_baseline(&original[position], item) {
                    changes.push(ItemChange::Changed {
                        current: item.clone(),
                        original: Some(original[position].clone()),
                    });
                }
                continue;
            }

            let elsewhere = original
                .iter()
                .enumerate()
                .position(|(index, o)| !matched[index] && o.same_identity(item));
            match elsewhere {
                Some(index) => {
                    matched[index] = true;
                    changes.push(ItemChange::Changed {
                        current: item.clone(),
                        original: Some(original[index].clone()),
                    });
                }
                None => changes.push(ItemChange::Added(item.clone())),
            }
        }

        for (index, item) in original.iter().enumerate() {
            if !matched[index] {
                changes.push(ItemChange::Removed(item.clone()));
            }
        }
        changes
    }

    // ---- mutation ------------------------------------------------------------------

    /// Append an item (sorted position under a persisted sort).
    pub fn add(&self, item: T) {
        let initializing = self.prepare();
        let index = self.list.add_indexed(item.clone());
        if initializing {
            self.mirror(|original| {
                let index = index.min(original.len());
                original.insert(index, item);
            });
        }
        recompute_changed(&self.inner, &self.list);
    }

    /// Add every item of an iterable.
    pub fn add_range(&self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.add(item);
        }
    }

    /// Insert an item at an explicit index.
    pub fn insert(&self, index: usize, item: T) -> crate::Result<()> {
        let initializing = self.prepare();
        self.list.insert(index, item.clone())?;
        if initializing {
            self.mirror(|original| {
                let index = index.min(original.len());
                original.insert(index, item);
            });
        }
        recompute_changed(&self.inner, &self.list);
        Ok(())
    }

    /// Replace the item at `index`.
    pub fn set(&self, index: usize, item: T) -> crate::Result<T> {
        let initializing = self.prepare();
        let old = self.list.set(index, item.clone())?;
        if initializing {
            self.mirror(|original| {
                if index < original.len() {
                    original[index] = item;
                }
            });
        }
        recompute_changed(&self.inner, &self.list);
        Ok(old)
    }

    /// Remove the first item structurally equal to `item`.
    pub fn remove(&self, item: &T) -> bool {
        match self.list.index_of(item) {
            Some(index) => self.remove_at(index).is_ok(),
            None => false,
        }
    }

    /// Remove the item at `index`.
    pub fn remove_at(&self, index: usize) -> crate::Result<T> {
        let initializing = self.prepare();
        let item = self.list.remove_at(index)?;
        if initializing {
            self.mirror(|original| {
                if index < original.len() {
                    original.remove(index);
                }
            });
        }
        recompute_changed(&self.inner, &self.list);
        Ok(item)
    }

    /// Remove every item matching the predicate, high-to-low, one `Remove` each.
    pub fn remove_all(&self, predicate: impl Fn(&T) -> bool) -> usize {
        let initializing = self.prepare();
        let removed = self.list.remove_all(&predicate);
        if initializing {
            self.mirror(|original| original.retain(|item| !predicate(item)));
        }
        recompute_changed(&self.inner, &self.list);
        removed
    }

    /// Move the item at `from` to `to`.
    pub fn move_item(&self, from: usize, to: usize) -> crate::Result<()> {
        let initializing = self.prepare();
        self.list.move_item(from, to)?;
        if initializing {
            self.mirror(|original| {
                if from < original.len() && to < original.len() {
                    let item = original.remove(from);
                    original.insert(to, item);
                }
            });
        }
        recompute_changed(&self.inner, &self.list);
        Ok(())
    }

    /// Remove every item.
    pub fn clear(&self) {
        let initializing = self.prepare();
        self.list.clear();
        if initializing {
            self.mirror(|original| original.clear());
        }
        recompute_changed(&self.inner, &self.list);
    }

    /// Sort with an explicit comparator; `persist` retains it for later `add`s.
    pub fn sort_by(
        &self,
        compare: impl Fn(&T, &T) -> std::cmp::Ordering + Send + Sync + 'static,
        persist: bool,
    ) {
        self.prepare();
        self.list.sort_by(compare, persist);
        recompute_changed(&self.inner, &self.list);
    }

    /// Re-place a single item after its sort key changed.
    pub fn update_sort_position(&self, item: &T) -> crate::Result<bool> {
        self.prepare();
        let moved = self.list.update_sort_position(item)?;
        recompute_changed(&self.inner, &self.list);
        Ok(moved)
    }

    /// Capture the original if this mutation is the first outside initialization.
    /// Returns whether an initialization scope is live.
    fn prepare(&self) -> bool {
        let mut state = self.lock_state();
        if state.init_depth > 0 {
            return true;
        }
        if state.original.is_none() {
            let items = match self.inner.list.upgrade() {
                Some(list) => list.items(),
                None => Vec::new(),
            };
            state.original = Some(items);
        }
        false
    }

    fn mirror(&self, f: impl FnOnce(&mut Vec<T>)) {
        let mut state = self.lock_state();
        if let Some(original) = state.original.as_mut() {
            f(original);
        }
    }

    // ---- reading & events ----------------------------------------------------------

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

    /// The first item, if any.
    pub fn first(&self) -> Option<T> {
        self.list.first()
    }

    /// The last item, if any.
    pub fn last(&self) -> Option<T> {
        self.list.last()
    }

    /// Whether any item structurally equals `item`.
    pub fn contains(&self, item: &T) -> bool {
        self.list.contains(item)
    }

    /// Index of the first item structurally equal to `item`.
    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.list.index_of(item)
    }

    /// Subscribe to structural change events.
    pub fn on_collection_changed(
        &self,
        handler: impl Fn(&CollectionEvent<T>) + Send + Sync + 'static,
    ) -> Subscription {
        self.list.on_collection_changed(handler)
    }

    /// The hot stream of structural changes.
    pub fn collection_changes(&self) -> impl Stream<Item = CollectionEvent<T>> + Send + use<T> {
        self.list.collection_changes()
    }

    /// Subscribe to collection-property changes, including `is_changed` toggles.
    pub fn on_property_changed(
        &self,
        handler: impl Fn(&CollectionPropertyChanged) + Send + Sync + 'static,
    ) -> Subscription {
        self.list.on_property_changed(handler)
    }

    /// The hot stream of collection-property changes.
    pub fn property_changes(&self) -> impl Stream<Item = CollectionPropertyChanged> + Send + use<T> {
        self.list.property_changes()
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
    ) -> crate::Result<impl Stream<Item = ItemChanged<T>> + Send + use<T>> {
        self.list.items_changes()
    }

    pub(crate) fn as_list(&self) -> &ObservableList<T> {
        &self.list
    }
}

/// Re-evaluate the changed summary against the baseline; raise on toggle.
fn recompute_changed<T: Item>(inner: &Arc<TrackedListInner<T>>, list: &ObservableList<T>) {
    let toggled = {
        let mut state = inner.state.lock().expect("tracked list state poisoned");
        if state.init_depth > 0 {
            return;
        }
        let items = list.items();
        let now_changed = match &state.original {
            Some(original) => !baseline_matches(original, &items),
            None => !items.iter().all(|item| matches_baseline(item, item)),
        };
        if state.is_changed == now_changed {
            false
        } else {
            state.is_changed = now_changed;
            true
        }
    };
    if toggled {
        list.raise_property(IS_CHANGED);
    }
}

fn baseline_matches<T: Item>(baseline: &[T], current: &[T]) -> bool {
    baseline.len() == current.len()
        && baseline
            .iter()
            .zip(current)
            .all(|(original, item)| matches_baseline(original, item))
}

fn tracked_models<T: Item>(items: &[T]) -> Vec<crate::Model> {
    items
        .iter()
        .filter_map(|item| item.as_model())
        .filter(|model| model.is_tracked())
        .cloned()
        .collect()
}

impl<T: Item + fmt::Debug> fmt::Debug for TrackedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedList")
            .field("items", &self.list.items())
            .field("is_changed", &self.is_changed())
            .finish()
    }
}
