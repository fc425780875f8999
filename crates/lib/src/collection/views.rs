//! Derived views over observable collections.
//!
//! Every view subscribes weakly to its source: the handler `Arc` is owned by the view
//! itself, so dropping the view kills the handler and the source's next delivery
//! sweeps the dead slot. A view therefore never keeps its source alive, and a source
//! never keeps a dropped view alive.

use std::sync::{Arc, Mutex, Weak};

use futures::Stream;
use tracing::error;

use super::list::WeakList;
use super::{
    CollectionEvent, CollectionPropertyChanged, Item, ItemChanged, ObservableList, TrackedList,
};
use crate::constants::VALUE;
use crate::notify::{Handler, Notifier, Subscription};

// ---- map view ----------------------------------------------------------------------

/// A read-only observable mirror of `selector(item)` for every source item, in source
/// order.
pub struct MappedView<T: Item, U: Item> {
    derived: ObservableList<U>,
    _handler: Handler<CollectionEvent<T>>,
    _sub: Subscription,
}

impl<T: Item, U: Item> MappedView<T, U> {
    /// Number of items.
    pub fn len(&self) -> usize {
        self.derived.len()
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.derived.is_empty()
    }

    /// Snapshot of the mapped items.
    pub fn items(&self) -> Vec<U> {
        self.derived.items()
    }

    /// The mapped item at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<U> {
        self.derived.get(index)
    }

    /// Subscribe to the view's structural change events.
    pub fn on_collection_changed(
        &self,
        handler: impl Fn(&CollectionEvent<U>) + Send + Sync + 'static,
    ) -> Subscription {
        self.derived.on_collection_changed(handler)
    }

    /// The hot stream of the view's structural changes.
    pub fn collection_changes(&self) -> impl Stream<Item = CollectionEvent<U>> + Send + use<T, U> {
        self.derived.collection_changes()
    }
}

// ---- combine view ------------------------------------------------------------------

/// A read-only observable concatenation of two source lists.
pub struct CombinedView<T: Item> {
    derived: ObservableList<T>,
    _handlers: [Handler<CollectionEvent<T>>; 2],
    _subs: [Subscription; 2],
}

impl<T: Item> CombinedView<T> {
    /// Number of items.
    pub fn len(&self) -> usize {
        self.derived.len()
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.derived.is_empty()
    }

    /// Snapshot of the combined items.
    pub fn items(&self) -> Vec<T> {
        self.derived.items()
    }

    /// The item at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<T> {
        self.derived.get(index)
    }

    /// Subscribe to the view's structural change events.
    pub fn on_collection_changed(
        &self,
        handler: impl Fn(&CollectionEvent<T>) + Send + Sync + 'static,
    ) -> Subscription {
        self.derived.on_collection_changed(handler)
    }

    /// The hot stream of the view's structural changes.
    pub fn collection_changes(&self) -> impl Stream<Item = CollectionEvent<T>> + Send + use<T> {
        self.derived.collection_changes()
    }
}

/// Present `left` followed by `right` as one read-only observable list.
pub fn combine_view<T: Item>(
    left: &ObservableList<T>,
    right: &ObservableList<T>,
) -> CombinedView<T> {
    let derived = ObservableList::from_items(left.items().into_iter().chain(right.items()));
    let boundary = Arc::new(Mutex::new(left.len()));
    let weak_left = left.downgrade();
    let weak_right = right.downgrade();

    let rebuild = {
        let derived = derived.clone();
        let boundary = boundary.clone();
        let weak_left = weak_left.clone();
        let weak_right = weak_right.clone();
        Arc::new(move || {
            let left_items = weak_left.upgrade().map(|l| l.items()).unwrap_or_default();
            let right_items = weak_right.upgrade().map(|l| l.items()).unwrap_or_default();
            *boundary.lock().expect("combine boundary poisoned") = left_items.len();
            derived.reset(left_items.into_iter().chain(right_items));
        })
    };

    let left_handler: Handler<CollectionEvent<T>> = {
        let derived = derived.clone();
        let boundary = boundary.clone();
        let rebuild = rebuild.clone();
        Arc::new(move |event| {
            let mut boundary = boundary.lock().expect("combine boundary poisoned");
            let outcome = match event {
                CollectionEvent::Add { index, items } => {
                    *boundary += items.len();
                    derived.insert_range(*index, items.clone())
                }
                CollectionEvent::Remove { index, items } => {
                    *boundary -= items.len();
                    derived.remove_range(*index, items.len()).map(|_| ())
                }
                CollectionEvent::Replace { index, new, .. } => {
                    derived.set(*index, new.clone()).map(|_| ())
                }
                CollectionEvent::Move { from, to, .. } => derived.move_item(*from, *to),
                CollectionEvent::Reset => {
                    drop(boundary);
                    rebuild();
                    return;
                }
            };
            if let Err(err) = outcome {
                error!(%err, "combine view fell out of sync with its left source");
            }
        })
    };

    let right_handler: Handler<CollectionEvent<T>> = {
        let derived = derived.clone();
        let boundary = boundary.clone();
        let rebuild = rebuild.clone();
        Arc::new(move |event| {
            let boundary = boundary.lock().expect("combine boundary poisoned");
            let offset = *boundary;
            let outcome = match event {
                CollectionEvent::Add { index, items } => {
                    derived.insert_range(offset + index, items.clone())
                }
                CollectionEvent::Remove { index, items } => {
                    derived.remove_range(offset + index, items.len()).map(|_| ())
                }
                CollectionEvent::Replace { index, new, .. } => {
                    derived.set(offset + index, new.clone()).map(|_| ())
                }
                CollectionEvent::Move { from, to, .. } => {
                    derived.move_item(offset + from, offset + to)
                }
                CollectionEvent::Reset => {
                    drop(boundary);
                    rebuild();
                    return;
                }
            };
            if let Err(err) = outcome {
                error!(%err, "combine view fell out of sync with its right source");
            }
        })
    };

    let subs = [
        left.on_collection_changed_weak(Arc::downgrade(&left_handler)),
        right.on_collection_changed_weak(Arc::downgrade(&right_handler)),
    ];
    CombinedView {
        derived,
        _handlers: [left_handler, right_handler],
        _subs: subs,
    }
}

// ---- new items view ----------------------------------------------------------------

/// A batch of items newly present after a source change.
#[derive(Clone, Debug)]
pub struct NewItems<T> {
    /// The items present now that were not present before the change.
    pub items: Vec<T>,
    /// Whether the source was initializing when the batch was produced. For
    /// non-trackable sources this reports true on resets.
    pub is_initializing: bool,
}

struct NewItemsInner<T: Item> {
    snapshot: Mutex<Vec<T>>,
    notifier: Notifier<NewItems<T>>,
    initializing: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
}

/// Emits, for each add/replace/reset of the source, the subset of items newly
/// present (by the collection's identity discipline).
pub struct NewItemsView<T: Item> {
    inner: Arc<NewItemsInner<T>>,
    _handler: Handler<CollectionEvent<T>>,
    _sub: Subscription,
}

impl<T: Item> NewItemsView<T> {
    /// Subscribe to new-item batches.
    pub fn subscribe(
        &self,
        handler: impl Fn(&NewItems<T>) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.notifier.subscribe(handler)
    }

    /// The hot stream of new-item batches.
    pub fn changes(&self) -> impl Stream<Item = NewItems<T>> + Send + use<T> {
        self.inner.notifier.subscribe_stream()
    }
}

fn new_items_with<T: Item>(
    source: &ObservableList<T>,
    initializing: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
) -> NewItemsView<T> {
    let inner = Arc::new(NewItemsInner {
        snapshot: Mutex::new(source.items()),
        notifier: Notifier::new(),
        initializing,
    });

    let weak_source = source.downgrade();
    let weak_inner: Weak<NewItemsInner<T>> = Arc::downgrade(&inner);
    let handler: Handler<CollectionEvent<T>> = Arc::new(move |event| {
        let (Some(inner), Some(source)) = (weak_inner.upgrade(), weak_source.upgrade()) else {
            return;
        };
        let current = source.items();
        let batch = {
            let mut snapshot = inner.snapshot.lock().expect("new items snapshot poisoned");
            let fresh = match event {
                CollectionEvent::Add { .. }
                | CollectionEvent::Replace { .. }
                | CollectionEvent::Reset => fresh_items(&snapshot, &current),
                CollectionEvent::Remove { .. } | CollectionEvent::Move { .. } => Vec::new(),
            };
            *snapshot = current;
            fresh
        };
        if batch.is_empty() {
            return;
        }
        let is_initializing = match &inner.initializing {
            Some(provider) => provider(),
            None => matches!(event, CollectionEvent::Reset),
        };
        inner.notifier.raise(&NewItems {
            items: batch,
            is_initializing,
        });
    });

    let sub = source.on_collection_changed_weak(Arc::downgrade(&handler));
    NewItemsView {
        inner,
        _handler: handler,
        _sub: sub,
    }
}

/// Multiset difference `current ∖ snapshot` under the identity discipline.
fn fresh_items<T: Item>(snapshot: &[T], current: &[T]) -> Vec<T> {
    let mut remaining: Vec<&T> = snapshot.iter().collect();
    current
        .iter()
        .filter(|item| {
            match remaining.iter().position(|s| s.same_identity(item)) {
                Some(position) => {
                    remaining.remove(position);
                    false
                }
                None => true,
            }
        })
        .cloned()
        .collect()
}

// ---- aggregate ---------------------------------------------------------------------

struct AggregateState<R> {
    cache: Option<R>,
    last_pushed: Option<R>,
}

struct AggregateInner<T: Item, R> {
    source: WeakList<T>,
    compute: Arc<dyn Fn(&[T]) -> R + Send + Sync>,
    state: Mutex<AggregateState<R>>,
    props: Notifier<CollectionPropertyChanged>,
    values: Notifier<R>,
    /// Item-property names that can affect the result; `None` means any can.
    watched: Option<Vec<String>>,
}

/// A lazily recomputed fold over a source list.
///
/// Raises a `value` property change whenever an incoming notification might change
/// the result; pushes through the value stream only when the recomputed value
/// actually differs from the last pushed one.
pub struct Aggregate<T: Item, R: Clone + PartialEq + Send + 'static> {
    inner: Arc<AggregateInner<T, R>>,
    _event_handler: Handler<CollectionEvent<T>>,
    _item_handler: Option<Handler<ItemChanged<T>>>,
    _subs: Vec<Subscription>,
}

impl<T: Item, R: Clone + PartialEq + Send + 'static> Aggregate<T, R> {
    /// The current value, recomputed on demand.
    pub fn value(&self) -> R {
        let mut state = self.inner.state.lock().expect("aggregate state poisoned");
        if let Some(cached) = &state.cache {
            return cached.clone();
        }
        let items = self
            .inner
            .source
            .upgrade()
            .map(|list| list.items())
            .unwrap_or_default();
        let computed = (self.inner.compute)(&items);
        state.cache = Some(computed.clone());
        computed
    }

    /// Subscribe to `value` property changes.
    pub fn on_property_changed(
        &self,
        handler: impl Fn(&CollectionPropertyChanged) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.props.subscribe(handler)
    }

    /// The hot stream of distinct computed values.
    pub fn values(&self) -> impl Stream<Item = R> + Send + use<T, R>
    where
        R: 'static,
    {
        self.inner.values.subscribe_stream()
    }
}

fn invalidate<T: Item, R: Clone + PartialEq + Send + 'static>(inner: &Arc<AggregateInner<T, R>>) {
    inner.props.raise(&CollectionPropertyChanged {
        property: VALUE.to_string(),
    });

    let push = {
        let mut state = inner.state.lock().expect("aggregate state poisoned");
        let items = inner
            .source
            .upgrade()
            .map(|list| list.items())
            .unwrap_or_default();
        let computed = (inner.compute)(&items);
        state.cache = Some(computed.clone());
        if state.last_pushed.as_ref() == Some(&computed) {
            None
        } else {
            state.last_pushed = Some(computed.clone());
            Some(computed)
        }
    };
    if let Some(value) = push {
        inner.values.raise(&value);
    }
}

fn aggregate_with<T: Item, R: Clone + PartialEq + Send + 'static>(
    source: &ObservableList<T>,
    compute: impl Fn(&[T]) -> R + Send + Sync + 'static,
    watched: Option<Vec<String>>,
) -> Aggregate<T, R> {
    let inner = Arc::new(AggregateInner {
        source: source.downgrade(),
        compute: Arc::new(compute),
        state: Mutex::new(AggregateState {
            cache: None,
            last_pushed: None,
        }),
        props: Notifier::new(),
        values: Notifier::new(),
        watched,
    });

    let mut subs = Vec::new();

    let weak: Weak<AggregateInner<T, R>> = Arc::downgrade(&inner);
    let event_handler: Handler<CollectionEvent<T>> = Arc::new(move |_event| {
        if let Some(inner) = weak.upgrade() {
            invalidate(&inner);
        }
    });
    subs.push(source.on_collection_changed_weak(Arc::downgrade(&event_handler)));

    let item_handler = if T::OBSERVABLE {
        let weak: Weak<AggregateInner<T, R>> = Arc::downgrade(&inner);
        let handler: Handler<ItemChanged<T>> = Arc::new(move |event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Some(watched) = &inner.watched
                && !watched.iter().any(|name| *name == event.property)
            {
                return;
            }
            invalidate(&inner);
        });
        match source.on_items_changed({
            let handler = handler.clone();
            move |event| handler(event)
        }) {
            Ok(sub) => {
                subs.push(sub);
                Some(handler)
            }
            Err(_) => None,
        }
    } else {
        None
    };

    Aggregate {
        inner,
        _event_handler: event_handler,
        _item_handler: item_handler,
        _subs: subs,
    }
}

// ---- constructors on the collection types ------------------------------------------

impl<T: Item> ObservableList<T> {
    /// A read-only observable mirror of `selector(item)` in source order.
    pub fn map_view<U: Item>(
        &self,
        selector: impl Fn(&T) -> U + Send + Sync + 'static,
    ) -> MappedView<T, U> {
        let selector = Arc::new(selector);
        let derived = ObservableList::from_items(self.items().iter().map(|i| selector(i)));

        let weak_source = self.downgrade();
        let handler: Handler<CollectionEvent<T>> = {
            let derived = derived.clone();
            let selector = selector.clone();
            Arc::new(move |event| {
                let outcome = match event {
                    CollectionEvent::Add { index, items } => {
                        derived.insert_range(*index, items.iter().map(|i| selector(i)))
                    }
                    CollectionEvent::Remove { index, items } => {
                        derived.remove_range(*index, items.len()).map(|_| ())
                    }
                    CollectionEvent::Replace { index, new, .. } => {
                        derived.set(*index, selector(new)).map(|_| ())
                    }
                    CollectionEvent::Move { from, to, .. } => derived.move_item(*from, *to),
                    CollectionEvent::Reset => {
                        match weak_source.upgrade() {
                            Some(source) => {
                                derived.reset(source.items().iter().map(|i| selector(i)));
                            }
                            None => derived.clear(),
                        }
                        Ok(())
                    }
                };
                if let Err(err) = outcome {
                    error!(%err, "map view fell out of sync with its source");
                }
            })
        };

        let sub = self.on_collection_changed_weak(Arc::downgrade(&handler));
        MappedView {
            derived,
            _handler: handler,
            _sub: sub,
        }
    }

    /// A view of the items newly present after each add/replace/reset.
    pub fn new_items_view(&self) -> NewItemsView<T> {
        new_items_with(self, None)
    }

    /// A lazily recomputed fold over the items.
    pub fn aggregate<R: Clone + PartialEq + Send + 'static>(
        &self,
        compute: impl Fn(&[T]) -> R + Send + Sync + 'static,
    ) -> Aggregate<T, R> {
        aggregate_with(self, compute, None)
    }

    /// As [`ObservableList::aggregate`], ignoring item notifications for properties
    /// not named in `watched`.
    pub fn aggregate_watched<R: Clone + PartialEq + Send + 'static>(
        &self,
        compute: impl Fn(&[T]) -> R + Send + Sync + 'static,
        watched: &[&str],
    ) -> Aggregate<T, R> {
        aggregate_with(
            self,
            compute,
            Some(watched.iter().map(|name| name.to_string()).collect()),
        )
    }
}

impl<T: Item> TrackedList<T> {
    /// A new-items view whose batches report whether this collection was
    /// initializing when they were produced.
    pub fn new_items_view(&self) -> NewItemsView<T> {
        let tracked = self.clone();
        new_items_with(
            self.as_list(),
            Some(Arc::new(move || tracked.is_initializing())),
        )
    }
}
