//! Multicast notification primitives.
//!
//! Every event in the crate (model property changes, collection structural changes,
//! per-item changes, aggregate invalidations) is raised through a [`Notifier`]. A
//! notifier owns a list of handler slots and a list of hot-stream senders. Handler
//! slots are either strong (`Arc`) or weak (`Weak`); a weak slot whose target has been
//! reclaimed is not an error — it is swept after the next delivery.
//!
//! # Delivery discipline
//!
//! `raise` snapshots the live handlers under the lock, pushes the event into every
//! hot-stream channel, releases the lock, and only then invokes the handlers. The
//! consequences are deliberate:
//!
//! * Handlers run without any notifier lock held, so they may freely re-enter the
//!   notifier (subscribe, unsubscribe, raise) or mutate the object that raised.
//! * A subscriber added during a delivery is not invoked for the in-flight event.
//! * A subscriber removed during a delivery may still observe the in-flight event
//!   (it was part of the snapshot), but iteration is never corrupted.


use std::sync::{Arc, Mutex, Weak};

use futures::Stream;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use uuid::Uuid;

/// A handler invoked synchronously for every raised event.
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A weakly held handler; the subscription self-removes once the target is reclaimed.
pub type WeakHandler<E> = Weak<dyn Fn(&E) + Send + Sync>;

enum HandlerRef<E> {
    Strong(Handler<E>),
    Weak(WeakHandler<E>),
}

impl<E> HandlerRef<E> {
    fn upgrade(&self) -> Option<Handler<E>> {
        match self {
            HandlerRef::Strong(h) => Some(h.clone()),
            HandlerRef::Weak(w) => w.upgrade(),
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            HandlerRef::Strong(_) => true,
            HandlerRef::Weak(w) => w.strong_count() > 0,
        }
    }
}

struct Slot<E> {
    id: Uuid,
    handler: HandlerRef<E>,
}

struct NotifierInner<E> {
    slots: Vec<Slot<E>>,
    senders: Vec<UnboundedSender<E>>,
}

/// A multicast event source with strong and weak handler slots and hot-stream fan-out.
pub struct Notifier<E> {
    inner: Arc<Mutex<NotifierInner<E>>>,
}

impl<E: Clone + Send + 'static> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Notifier<E> {
    fn clone(&self) -> Self {
        Notifier {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Clone + Send + 'static> Notifier<E> {
    /// Create a notifier with no subscribers.
    pub fn new() -> Self {
        Notifier {
            inner: Arc::new(Mutex::new(NotifierInner {
                slots: Vec::new(),
                senders: Vec::new(),
            })),
        }
    }

    /// Subscribe a handler. The handler is held strongly until the returned
    /// [`Subscription`] is dropped or `unsubscribe` is called.
    pub fn subscribe(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        self.subscribe_arc(Arc::new(handler))
    }

    /// Subscribe an already-shared handler.
    pub fn subscribe_arc(&self, handler: Handler<E>) -> Subscription {
        self.add_slot(HandlerRef::Strong(handler))
    }

    /// Subscribe a weakly held handler. Delivery upgrades per event; once the
    /// target is reclaimed the slot self-removes during the next sweep.
    pub fn subscribe_weak(&self, handler: WeakHandler<E>) -> Subscription {
        self.add_slot(HandlerRef::Weak(handler))
    }

    fn add_slot(&self, handler: HandlerRef<E>) -> Subscription {
        let id = Uuid::new_v4();
        {
            let mut inner = self.inner.lock().expect("notifier lock poisoned");
            inner.slots.push(Slot { id, handler });
        }
        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.lock().expect("notifier lock poisoned");
                inner.slots.retain(|slot| slot.id != id);
            }
        })
    }

    /// Open a hot stream of events. The stream observes only events raised after
    /// this call; it never replays, and it completes when the notifier is dropped.
    pub fn subscribe_stream(&self) -> impl Stream<Item = E> + Send + use<E> {
        let (sender, receiver) = unbounded();
        let mut inner = self.inner.lock().expect("notifier lock poisoned");
        inner.senders.push(sender);
        receiver
    }

    /// Raise an event to every stream and every live handler.
    pub fn raise(&self, event: &E) {
        let snapshot: Vec<Handler<E>> = {
            let mut inner = self.inner.lock().expect("notifier lock poisoned");
            inner
                .senders
                .retain(|sender| sender.unbounded_send(event.clone()).is_ok());
            inner
                .slots
                .iter()
                .filter_map(|slot| slot.handler.upgrade())
                .collect()
        };

        for handler in snapshot {
            handler(event);
        }

        // Sweep slots whose weak target died, either before this delivery or during it.
        let mut inner = self.inner.lock().expect("notifier lock poisoned");
        inner.slots.retain(|slot| slot.handler.is_alive());
    }

    /// Number of live handler slots (weak slots count until swept).
    pub fn handler_count(&self) -> usize {
        self.inner.lock().expect("notifier lock poisoned").slots.len()
    }

    /// Number of open hot streams.
    pub fn stream_count(&self) -> usize {
        self.inner
            .lock()
            .expect("notifier lock poisoned")
            .senders
            .len()
    }
}

/// A property change raised by a notifying source.
///
/// The source handle is carried in the event so that aggregated streams (for example a
/// collection's per-item change stream) can tell which instance raised.
#[derive(Clone, Debug)]
pub struct PropertyChanged<S> {
    /// The instance that raised the change.
    pub source: S,
    /// The name of the property that changed.
    pub property: String,
}

impl<S> PropertyChanged<S> {
    pub(crate) fn new(source: S, property: impl Into<String>) -> Self {
        PropertyChanged {
            source,
            property: property.into(),
        }
    }
}

/// RAII handle for a registered handler or binding.
///
/// Dropping the subscription removes the handler; [`Subscription::detach`] leaves the
/// handler registered for the lifetime of its notifier instead.
#[must_use = "dropping a Subscription immediately unsubscribes the handler"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Subscription {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Remove the handler now.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Leave the handler registered; the subscription handle is consumed.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("live", &self.cancel.is_some())
            .finish()
    }
}
