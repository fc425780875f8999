//! Hot multicast subjects.
//!
//! A [`Subject`] broadcasts pushed values to every open subscriber stream. Subscribers
//! snapshot nothing and replay nothing: a stream opened after a push never observes it,
//! and a stream opened during a push does not observe the in-flight value (pushes go
//! through the sender list under the lock; a new subscriber is appended after).
//!
//! Terminal signals are sticky. `on_completed` and `on_error` close every subscriber
//! stream and put the subject in a terminal state; later pushes are ignored and later
//! subscribers receive an immediately closed stream. The terminal state is observable
//! through [`Subject::terminal`] and surfaces as a `Result` from the async accessors
//! in [`super::ops`].

use std::sync::{Arc, Mutex};

use futures::Stream;
use futures::channel::mpsc::{UnboundedSender, unbounded};

use super::StreamError;

/// Sticky terminal state of a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// The subject completed normally.
    Completed,
    /// The subject was torn down with an error.
    Error(String),
}

struct SubjectInner<T> {
    senders: Vec<UnboundedSender<T>>,
    terminal: Option<Terminal>,
}

/// A hot multicast stream without replay.
pub struct Subject<T> {
    inner: Arc<Mutex<SubjectInner<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Subject {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Subject<T> {
    /// Create a subject with no subscribers.
    pub fn new() -> Self {
        Subject {
            inner: Arc::new(Mutex::new(SubjectInner {
                senders: Vec::new(),
                terminal: None,
            })),
        }
    }

    /// Open a subscriber stream. Observes only values pushed after this call; the
    /// stream ends when the subject completes, errors, or is dropped.
    pub fn subscribe(&self) -> impl Stream<Item = T> + Send + use<T> {
        let (sender, receiver) = unbounded();
        let mut inner = self.inner.lock().expect("subject lock poisoned");
        if inner.terminal.is_none() {
            inner.senders.push(sender);
        }
        receiver
    }

    /// Push a value to every subscriber. Ignored once terminal.
    pub fn on_next(&self, value: T) {
        let mut inner = self.inner.lock().expect("subject lock poisoned");
        if inner.terminal.is_some() {
            return;
        }
        inner
            .senders
            .retain(|sender| sender.unbounded_send(value.clone()).is_ok());
    }

    /// Complete the subject: every subscriber stream ends. Idempotent.
    pub fn on_completed(&self) {
        self.terminate(Terminal::Completed);
    }

    /// Tear the subject down with an error: every subscriber stream ends and the
    /// error becomes the sticky terminal state. Idempotent (first signal wins).
    pub fn on_error(&self, reason: impl Into<String>) {
        self.terminate(Terminal::Error(reason.into()));
    }

    fn terminate(&self, terminal: Terminal) {
        let mut inner = self.inner.lock().expect("subject lock poisoned");
        if inner.terminal.is_some() {
            return;
        }
        inner.terminal = Some(terminal);
        inner.senders.clear();
    }

    /// The sticky terminal state, if any.
    pub fn terminal(&self) -> Option<Terminal> {
        self.inner
            .lock()
            .expect("subject lock poisoned")
            .terminal
            .clone()
    }

    /// Number of open subscriber streams.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .expect("subject lock poisoned")
            .senders
            .len()
    }

    fn terminal_error(&self) -> Option<StreamError> {
        match self.terminal() {
            Some(Terminal::Error(reason)) => Some(StreamError::Aborted { reason }),
            _ => None,
        }
    }

    /// Await the first value pushed after this call. Fails with
    /// [`StreamError::EmptySequence`] if the subject completes first, or with
    /// [`StreamError::Aborted`] if it errors first.
    pub async fn first_value(&self) -> crate::Result<T> {
        use futures::StreamExt;

        let stream = self.subscribe();
        futures::pin_mut!(stream);
        match stream.next().await {
            Some(value) => Ok(value),
            None => Err(self
                .terminal_error()
                .unwrap_or(StreamError::EmptySequence)
                .into()),
        }
    }
}

/// A hot multicast stream that remembers its current value.
///
/// Every subscriber immediately receives the current value, then subsequent values.
pub struct BehaviorSubject<T> {
    subject: Subject<T>,
    value: Arc<Mutex<T>>,
}

impl<T> Clone for BehaviorSubject<T> {
    fn clone(&self) -> Self {
        BehaviorSubject {
            subject: self.subject.clone(),
            value: self.value.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> BehaviorSubject<T> {
    /// Create a behavior subject seeded with `initial`.
    pub fn new(initial: T) -> Self {
        BehaviorSubject {
            subject: Subject::new(),
            value: Arc::new(Mutex::new(initial)),
        }
    }

    /// The current value.
    pub fn value(&self) -> T {
        self.value.lock().expect("behavior value poisoned").clone()
    }

    /// Open a subscriber stream. The current value is delivered first, then every
    /// subsequent push. A terminal subject yields the current value and ends.
    pub fn subscribe(&self) -> impl Stream<Item = T> + Send + use<T> {
        let (sender, receiver) = unbounded();
        // Hold the value lock across registration so a concurrent push cannot
        // slip between the replayed value and the live subscription.
        let value = self.value.lock().expect("behavior value poisoned");
        let _ = sender.unbounded_send(value.clone());
        let mut inner = self.subject.inner.lock().expect("subject lock poisoned");
        if inner.terminal.is_none() {
            inner.senders.push(sender);
        }
        receiver
    }

    /// Push a value: it becomes the current value and broadcasts to subscribers.
    /// Ignored once terminal.
    pub fn on_next(&self, value: T) {
        let mut current = self.value.lock().expect("behavior value poisoned");
        if self.subject.terminal().is_some() {
            return;
        }
        *current = value.clone();
        drop(current);
        self.subject.on_next(value);
    }

    /// Complete the subject.
    pub fn on_completed(&self) {
        self.subject.on_completed();
    }

    /// Tear down with an error.
    pub fn on_error(&self, reason: impl Into<String>) {
        self.subject.on_error(reason);
    }

    /// The sticky terminal state, if any.
    pub fn terminal(&self) -> Option<Terminal> {
        self.subject.terminal()
    }
}
