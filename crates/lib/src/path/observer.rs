//! Property-path observation.
//!
//! A [`PathObserver`] watches a chain of properties (`root.a.b.c`). One binding per
//! path step subscribes to the `property_changed` event of the model currently at that
//! step; when a watched name fires, the downstream bindings are rewired against the
//! new value and the terminal value is re-evaluated. Emission is deduplicated by
//! structural equality against the last emitted value.
//!
//! The chain activates on the first subscriber and deactivates (releasing every
//! intermediate subscription) when the last subscriber unsubscribes. A `Null`
//! intermediate stops the chain: the terminal value is `Null` until the step is
//! assigned again. Rewiring keeps a binding whose model is identical (by handle) to
//! the one already bound, so a handler re-assigning an intermediate node to itself
//! cannot loop.

use std::sync::{Arc, Mutex, Weak};

use tracing::warn;
use uuid::Uuid;

use super::{PathBuf, PathError, parse_cached};
use crate::model::{Model, Value};
use crate::notify::Subscription;

/// Callback invoked with each newly emitted terminal value.
pub type PathHandler = Arc<dyn Fn(&Value) + Send + Sync>;

struct Binding {
    model: Model,
    _sub: Subscription,
}

struct ObserverState {
    bindings: Vec<Binding>,
    last: Value,
    /// A resolution failure discovered during a rewire; cleared when the path
    /// resolves again.
    parked: Option<PathError>,
    subscribers: Vec<(Uuid, PathHandler)>,
    active: bool,
}

struct ObserverInner {
    root: Model,
    path: Arc<PathBuf>,
    components: Vec<String>,
    state: Mutex<ObserverState>,
}

/// Observes a property chain on a root model and republishes the terminal value.
#[derive(Clone)]
pub struct PathObserver {
    inner: Arc<ObserverInner>,
}

/// Observe the dotted property chain `path` against `root`.
///
/// The chain is validated eagerly: every step that is statically reachable must be a
/// declared property, otherwise [`PathError::MissingProperty`] is returned. Steps
/// behind a currently-`Null` intermediate are validated lazily, when the intermediate
/// is assigned.
pub fn observe(root: &Model, path: &str) -> crate::Result<PathObserver> {
    let path = parse_cached(path)?;
    let components: Vec<String> = path.components().map(str::to_string).collect();
    validate_reachable(root, &components)?;

    Ok(PathObserver {
        inner: Arc::new(ObserverInner {
            root: root.clone(),
            path,
            components,
            state: Mutex::new(ObserverState {
                bindings: Vec::new(),
                last: Value::Null,
                parked: None,
                subscribers: Vec::new(),
                active: false,
            }),
        }),
    })
}

impl PathObserver {
    /// The observed path.
    pub fn path(&self) -> &PathBuf {
        &self.inner.path
    }

    /// Evaluate the chain now. Reports a parked resolution failure if the last rewire
    /// hit one.
    pub fn value(&self) -> crate::Result<Value> {
        {
            let state = self.lock_state();
            if let Some(parked) = &state.parked {
                return Err(parked.clone().into());
            }
        }
        Ok(evaluate(&self.inner.root, &self.inner.components)?)
    }

    /// Subscribe to terminal-value emissions. The first subscriber activates the
    /// chain; subscribing from within an emission is allowed and does not observe the
    /// in-flight value.
    pub fn subscribe(&self, handler: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        let id = Uuid::new_v4();
        {
            let mut state = self.lock_state();
            state.subscribers.push((id, Arc::new(handler)));
            if !state.active {
                self.activate(&mut state);
            }
        }

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut state = inner.state.lock().expect("path observer state poisoned");
                state.subscribers.retain(|(sub_id, _)| *sub_id != id);
                if state.subscribers.is_empty() {
                    state.bindings.clear();
                    state.active = false;
                }
            }
        })
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock_state().subscribers.len()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ObserverState> {
        self.inner.state.lock().expect("path observer state poisoned")
    }

    fn activate(&self, state: &mut ObserverState) {
        state.active = true;
        sync_bindings(&self.inner, state);
        match evaluate(&self.inner.root, &self.inner.components) {
            Ok(value) => {
                state.last = value;
                state.parked = None;
            }
            Err(error) => state.parked = Some(error),
        }
    }
}

impl std::fmt::Debug for PathObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathObserver")
            .field("root", &self.inner.root.type_name())
            .field("path", &self.inner.path.as_str())
            .finish()
    }
}

/// Re-evaluate after a model along the chain raised its watched component.
fn on_path_changed(inner: &Arc<ObserverInner>) {
    let (emit, snapshot) = {
        let mut state = inner.state.lock().expect("path observer state poisoned");
        if !state.active {
            return;
        }
        sync_bindings(inner, &mut state);

        match evaluate(&inner.root, &inner.components) {
            Ok(value) => {
                state.parked = None;
                if value != state.last {
                    state.last = value.clone();
                    let snapshot: Vec<PathHandler> =
                        state.subscribers.iter().map(|(_, h)| h.clone()).collect();
                    (Some(value), snapshot)
                } else {
                    (None, Vec::new())
                }
            }
            Err(error) => {
                warn!(
                    path = inner.path.as_str(),
                    %error,
                    "property path became unresolvable during rewire"
                );
                state.parked = Some(error);
                (None, Vec::new())
            }
        }
    };

    if let Some(value) = emit {
        for handler in snapshot {
            handler(&value);
        }
    }
}

/// Bring the binding chain in line with the models currently along the path.
/// Bindings whose model is unchanged (by handle identity) are kept as-is.
fn sync_bindings(inner: &Arc<ObserverInner>, state: &mut ObserverState) {
    let chain = model_chain(&inner.root, &inner.components);

    let mut keep = 0;
    while keep < state.bindings.len()
        && keep < chain.len()
        && state.bindings[keep].model.ptr_eq(&chain[keep])
    {
        keep += 1;
    }
    state.bindings.truncate(keep);

    for (level, model) in chain.into_iter().enumerate().skip(keep) {
        let component = inner.components[level].clone();
        let weak: Weak<ObserverInner> = Arc::downgrade(inner);
        let sub = model.on_property_changed(move |event| {
            if event.property == component
                && let Some(inner) = weak.upgrade()
            {
                on_path_changed(&inner);
            }
        });
        state.bindings.push(Binding { model, _sub: sub });
    }
}

/// The model hosting each path step, cut short at the first `Null` or leaf.
fn model_chain(root: &Model, components: &[String]) -> Vec<Model> {
    let mut chain = vec![root.clone()];
    for (index, component) in components.iter().enumerate() {
        if index + 1 == components.len() {
            break;
        }
        let Ok(Value::Model(next)) = chain[index].get(component) else {
            break;
        };
        chain.push(next);
    }
    chain
}

/// Evaluate the terminal value of the chain. A `Null` intermediate yields `Null`.
fn evaluate(root: &Model, components: &[String]) -> Result<Value, PathError> {
    let mut current = root.clone();
    for (index, component) in components.iter().enumerate() {
        let value = match current.get(component) {
            Ok(value) => value,
            Err(_) => {
                return Err(PathError::MissingProperty {
                    type_name: current.type_name().to_string(),
                    property: component.clone(),
                    position: index,
                });
            }
        };
        if index + 1 == components.len() {
            return Ok(value);
        }
        match value {
            Value::Model(next) => current = next,
            Value::Null => return Ok(Value::Null),
            other => {
                return Err(PathError::NotTraversable {
                    kind: other.type_name(),
                    property: components[index + 1].clone(),
                    position: index + 1,
                });
            }
        }
    }
    Ok(Value::Null)
}

/// Validate every statically reachable step of the chain against the schemas along it.
fn validate_reachable(root: &Model, components: &[String]) -> Result<(), PathError> {
    let mut current = root.clone();
    for (index, component) in components.iter().enumerate() {
        if current.schema().property(component).is_none() {
            return Err(PathError::MissingProperty {
                type_name: current.type_name().to_string(),
                property: component.clone(),
                position: index,
            });
        }
        if index + 1 == components.len() {
            break;
        }
        match current.get(component) {
            Ok(Value::Model(next)) => current = next,
            Ok(Value::Null) => break,
            Ok(other) => {
                return Err(PathError::NotTraversable {
                    kind: other.type_name(),
                    property: components[index + 1].clone(),
                    position: index + 1,
                });
            }
            Err(_) => break,
        }
    }
    Ok(())
}
