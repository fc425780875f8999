//! Observable and tracked model instances.
//!
//! A [`Model`] is a proxy over a bag of property slots described by a [`Schema`]. Every
//! write diffs against the stored value and raises a property-change notification
//! through the model's notifier: to the synchronous handler chain, to the hot
//! `property_changes` stream, and to every transitive dependent property.
//!
//! Instances produced by the tracking factory additionally shadow an *original* value
//! per property. The changed-set holds exactly the property names whose current value
//! differs from its original (by the property's comparison discipline); `is_changed`
//! is its non-emptiness, raised as its own property-change whenever it toggles, before
//! the triggering property. Accept/reject semantics compose through nested tracked
//! values: a tracked child attached to a property propagates its own `is_changed`
//! toggles up to the owner.
//!
//! # Locking discipline
//!
//! All mutation happens in two phases: state changes are applied under the instance
//! lock while the names to raise are collected; notifications are delivered after the
//! lock is released. Handlers may therefore freely re-enter the instance. The only
//! cross-instance call made under the lock is subscribing to (or dropping a
//! subscription on) a child's notifier, which is a leaf lock.

mod errors;
mod schema;
#[cfg(test)]
mod tests;
pub mod value;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

pub use errors::{ModelError, SchemaError};
use futures::Stream;
pub use schema::{ModelType, PropertyDecl, PropertyDescriptor, Schema, SchemaBuilder};
use serde::Serialize;
pub use value::Value;

use crate::constants::IS_CHANGED;
use crate::notify::{Notifier, PropertyChanged, Subscription, WeakHandler};

/// A property change raised by a model.
pub type ModelChanged = PropertyChanged<Model>;

/// One entry of a change report: a property whose current value differs from the
/// baseline it was compared against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    /// The property name.
    pub property: String,
    /// The baseline value (the original slot, or the other side's current value).
    pub original: Value,
    /// The current value.
    pub current: Value,
}

struct ModelState {
    current: Vec<Value>,
    /// Original slots; empty unless the instance is tracked.
    original: Vec<Value>,
    /// Names of trackable properties whose current value differs from original.
    changed: HashSet<String>,
    init_depth: u32,
    /// Nested-change subscriptions per slot holding a tracked child.
    child_subs: HashMap<usize, Subscription>,
    /// First-observed, deduplicated raise queue; `Some` while a deferral scope is live.
    pending: Option<Vec<String>>,
}

struct ModelInner {
    schema: Arc<Schema>,
    tracked: bool,
    state: Mutex<ModelState>,
    notifier: Notifier<ModelChanged>,
}

/// An observable (optionally tracked) model instance. Cloning clones the handle.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

/// Produce an observable instance of `T` with default property values.
pub fn create_observable<T: ModelType>() -> crate::Result<Model> {
    Ok(Model::new(schema::schema_of::<T>()?, false))
}

/// Produce an observable instance of `T`, customized by `build` before it is returned.
pub fn create_observable_with<T: ModelType>(
    build: impl FnOnce(&Model) -> crate::Result<()>,
) -> crate::Result<Model> {
    let model = create_observable::<T>()?;
    build(&model)?;
    Ok(model)
}

/// Produce a tracked instance of `T`: every trackable property carries an
/// original-value shadow, and `is_tracked` reports true.
pub fn create_trackable<T: ModelType>() -> crate::Result<Model> {
    Ok(Model::new(schema::schema_of::<T>()?, true))
}

/// Produce a tracked instance of `T`, customized by `build` inside an initialization
/// scope, so the built values become the baseline.
pub fn create_trackable_with<T: ModelType>(
    build: impl FnOnce(&Model) -> crate::Result<()>,
) -> crate::Result<Model> {
    let model = create_trackable::<T>()?;
    model.begin_init()?;
    let result = build(&model);
    model.end_init()?;
    result?;
    Ok(model)
}

impl Model {
    fn new(schema: Arc<Schema>, tracked: bool) -> Model {
        let current: Vec<Value> = schema
            .properties()
            .map(|p| p.default_value().clone())
            .collect();
        let original = if tracked { current.clone() } else { Vec::new() };

        Model {
            inner: Arc::new(ModelInner {
                schema,
                tracked,
                state: Mutex::new(ModelState {
                    current,
                    original,
                    changed: HashSet::new(),
                    init_depth: 0,
                    child_subs: HashMap::new(),
                    pending: None,
                }),
                notifier: Notifier::new(),
            }),
        }
    }

    /// The declared type name of this instance.
    pub fn type_name(&self) -> &'static str {
        self.inner.schema.type_name()
    }

    /// The compiled schema of this instance.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    /// Whether this instance was produced by the tracking factory.
    pub fn is_tracked(&self) -> bool {
        self.inner.tracked
    }

    /// Handle identity.
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Structural equality: same declared type and deep-equal current values.
    pub fn structural_eq(&self, other: &Model) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if !Arc::ptr_eq(&self.inner.schema, &other.inner.schema) {
            return false;
        }
        let mine = self.current_values();
        let theirs = other.current_values();
        mine == theirs
    }

    /// Current values of every property, in declaration order.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        let values = self.current_values();
        self.inner
            .schema
            .properties()
            .map(|p| p.name().to_string())
            .zip(values)
            .collect()
    }

    fn current_values(&self) -> Vec<Value> {
        self.lock_state().current.clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ModelState> {
        self.inner.state.lock().expect("model state poisoned")
    }

    fn unknown_property(&self, name: &str) -> ModelError {
        ModelError::UnknownProperty {
            type_name: self.type_name().to_string(),
            property: name.to_string(),
        }
    }

    fn slot_of(&self, name: &str) -> Result<usize, ModelError> {
        self.inner
            .schema
            .slot_of(name)
            .ok_or_else(|| self.unknown_property(name))
    }

    fn require_tracked(&self, operation: &'static str) -> Result<(), ModelError> {
        if self.inner.tracked {
            Ok(())
        } else {
            Err(ModelError::NotTracked {
                type_name: self.type_name().to_string(),
                operation,
            })
        }
    }

    // ---- reading -------------------------------------------------------------------

    /// Read the current value of a property.
    pub fn get(&self, name: &str) -> crate::Result<Value> {
        let slot = self.slot_of(name)?;
        Ok(self.lock_state().current[slot].clone())
    }

    /// Read a text property.
    pub fn get_text(&self, name: &str) -> crate::Result<String> {
        let value = self.get(name)?;
        match value {
            Value::Text(s) => Ok(s),
            other => Err(self.type_mismatch(name, "text", &other)),
        }
    }

    /// Read an integer property.
    pub fn get_int(&self, name: &str) -> crate::Result<i64> {
        let value = self.get(name)?;
        match value {
            Value::Int(n) => Ok(n),
            other => Err(self.type_mismatch(name, "int", &other)),
        }
    }

    /// Read a boolean property.
    pub fn get_bool(&self, name: &str) -> crate::Result<bool> {
        let value = self.get(name)?;
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(self.type_mismatch(name, "bool", &other)),
        }
    }

    /// Read a nested-model property. `Null` reads as `None`.
    pub fn get_model(&self, name: &str) -> crate::Result<Option<Model>> {
        let value = self.get(name)?;
        match value {
            Value::Model(m) => Ok(Some(m)),
            Value::Null => Ok(None),
            other => Err(self.type_mismatch(name, "model", &other)),
        }
    }

    /// Read a nested-list property. `Null` reads as `None`.
    pub fn get_list(&self, name: &str) -> crate::Result<Option<crate::TrackedList<Value>>> {
        let value = self.get(name)?;
        match value {
            Value::List(l) => Ok(Some(l)),
            Value::Null => Ok(None),
            other => Err(self.type_mismatch(name, "list", &other)),
        }
    }

    fn type_mismatch(&self, name: &str, expected: &'static str, actual: &Value) -> crate::Error {
        ModelError::TypeMismatch {
            property: name.to_string(),
            expected,
            actual: actual.type_name(),
        }
        .into()
    }

    // ---- writing -------------------------------------------------------------------

    /// Write a property.
    ///
    /// On an observable instance the write is skipped entirely when the incoming value
    /// equals the stored one. On a tracked instance the write always stores and raises;
    /// the changed-set is maintained against the original slot, and an `is_changed`
    /// toggle is raised before the property itself.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> crate::Result<()> {
        let slot = self.slot_of(name)?;
        let descriptor = self.inner.schema.descriptor(slot);
        if descriptor.is_read_only() {
            return Err(ModelError::ReadOnlyProperty {
                type_name: self.type_name().to_string(),
                property: name.to_string(),
            }
            .into());
        }

        let incoming = value.into();
        if self.inner.tracked {
            self.set_tracked(slot, incoming);
        } else {
            let changed = {
                let mut state = self.lock_state();
                if descriptor.values_equal(&state.current[slot], &incoming) {
                    false
                } else {
                    state.current[slot] = incoming;
                    true
                }
            };
            if changed {
                self.raise_names(self.expand_with_dependents(name));
            }
        }
        Ok(())
    }

    fn set_tracked(&self, slot: usize, incoming: Value) {
        let descriptor = self.inner.schema.descriptor(slot);
        let name = descriptor.name().to_string();

        let (toggled, detached) = {
            let mut state = self.lock_state();
            let detached = state.child_subs.remove(&slot);
            let initializing = state.init_depth > 0;

            if initializing {
                state.original[slot] = incoming.clone();
            }

            let mut toggled = false;
            if descriptor.is_trackable() && !initializing {
                let mut different = !descriptor.values_equal(&state.original[slot], &incoming);
                if !different
                    && !descriptor.is_reference_only()
                    && let Some(child) = incoming.tracked_model()
                    && !child.ptr_eq(self)
                    && child.is_changed()
                {
                    different = true;
                }

                let was_empty = state.changed.is_empty();
                if different {
                    state.changed.insert(name.clone());
                } else {
                    state.changed.remove(&name);
                }
                toggled = was_empty != state.changed.is_empty();
            }

            state.current[slot] = incoming;
            self.attach_child_locked(&mut state, slot);
            (toggled, detached)
        };
        drop(detached);

        let mut names = Vec::new();
        if toggled {
            names.push(IS_CHANGED.to_string());
        }
        names.extend(self.expand_with_dependents(&name));
        self.raise_names(names);
    }

    /// Subscribe the nested-change listener for the tracked child currently stored in
    /// `slot`, if any. Must be called with the state lock held.
    fn attach_child_locked(&self, state: &mut ModelState, slot: usize) {
        let descriptor = self.inner.schema.descriptor(slot);
        if !self.inner.tracked || !descriptor.is_trackable() || descriptor.is_reference_only() {
            return;
        }
        let Some(child) = state.current[slot].tracked_model() else {
            return;
        };

        let weak: Weak<ModelInner> = Arc::downgrade(&self.inner);
        let subscription = child.inner.notifier.subscribe(move |event: &ModelChanged| {
            if event.property == IS_CHANGED
                && let Some(inner) = weak.upgrade()
            {
                Model { inner }.refresh_tracked_slot(slot);
            }
        });
        state.child_subs.insert(slot, subscription);
    }

    /// Re-evaluate one property's changed state after its nested child toggled.
    fn refresh_tracked_slot(&self, slot: usize) {
        let descriptor = self.inner.schema.descriptor(slot);
        let name = descriptor.name().to_string();

        let toggled = {
            let mut state = self.lock_state();
            if state.init_depth > 0 {
                return;
            }
            let mut different =
                !descriptor.values_equal(&state.original[slot], &state.current[slot]);
            if !different
                && !descriptor.is_reference_only()
                && let Some(child) = state.current[slot].tracked_model()
                && !child.ptr_eq(self)
                && child.is_changed()
            {
                different = true;
            }

            let was_empty = state.changed.is_empty();
            if different {
                state.changed.insert(name);
            } else {
                state.changed.remove(&name);
            }
            was_empty != state.changed.is_empty()
        };

        if toggled {
            self.raise_names(vec![IS_CHANGED.to_string()]);
        }
    }

    // ---- notification --------------------------------------------------------------

    /// Subscribe a handler to this instance's property-change event.
    pub fn on_property_changed(
        &self,
        handler: impl Fn(&ModelChanged) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.notifier.subscribe(handler)
    }

    /// Subscribe a weakly held handler; it self-removes once its target is reclaimed.
    pub fn on_property_changed_weak(&self, handler: WeakHandler<ModelChanged>) -> Subscription {
        self.inner.notifier.subscribe_weak(handler)
    }

    /// Open the hot stream of property changes. Only changes raised after this call
    /// are observed; an in-flight delivery is never replayed into a new stream.
    pub fn property_changes(&self) -> impl Stream<Item = ModelChanged> + Send + use<> {
        self.inner.notifier.subscribe_stream()
    }

    /// Manually raise a property change (with dependency fan-out).
    pub fn raise_property_changed(&self, name: &str) -> crate::Result<()> {
        if name != IS_CHANGED {
            self.slot_of(name)?;
        }
        self.raise_names(self.expand_with_dependents(name));
        Ok(())
    }

    /// Enter a deferral scope: notifications accumulate, deduplicated by property name
    /// in first-observed order, and flush when the returned guard drops.
    pub fn defer_property_changes(&self) -> crate::Result<DeferGuard> {
        {
            let mut state = self.lock_state();
            if state.pending.is_some() {
                return Err(ModelError::AlreadyDeferred {
                    type_name: self.type_name().to_string(),
                }
                .into());
            }
            state.pending = Some(Vec::new());
        }
        Ok(DeferGuard {
            model: self.clone(),
        })
    }

    fn expand_with_dependents(&self, name: &str) -> Vec<String> {
        let mut names = vec![name.to_string()];
        names.extend(self.inner.schema.dependents_of(name).iter().cloned());
        names
    }

    fn raise_names(&self, names: Vec<String>) {
        let to_raise = {
            let mut state = self.lock_state();
            if let Some(pending) = state.pending.as_mut() {
                for name in names {
                    if !pending.contains(&name) {
                        pending.push(name);
                    }
                }
                return;
            }
            names
        };

        for name in to_raise {
            self.inner
                .notifier
                .raise(&PropertyChanged::new(self.clone(), name));
        }
    }

    // ---- tracking ------------------------------------------------------------------

    /// Whether any trackable property currently differs from its original value.
    /// Always false for untracked instances.
    pub fn is_changed(&self) -> bool {
        self.inner.tracked && !self.lock_state().changed.is_empty()
    }

    /// Whether an initialization scope is live.
    pub fn is_initializing(&self) -> bool {
        self.inner.tracked && self.lock_state().init_depth > 0
    }

    /// Read the original value of a property.
    pub fn get_original(&self, name: &str) -> crate::Result<Value> {
        self.require_tracked("get_original")?;
        let slot = self.slot_of(name)?;
        Ok(self.lock_state().original[slot].clone())
    }

    /// Enter an initialization scope. Writes inside the scope seed both slots and do
    /// not contribute to the changed-set. Re-entrant; refuses while changed.
    pub fn begin_init(&self) -> crate::Result<()> {
        self.require_tracked("begin_init")?;
        let mut state = self.lock_state();
        if !state.changed.is_empty() {
            return Err(ModelError::BeginInitWhileChanged {
                type_name: self.type_name().to_string(),
            }
            .into());
        }
        state.init_depth += 1;
        Ok(())
    }

    /// Leave an initialization scope.
    pub fn end_init(&self) -> crate::Result<()> {
        self.require_tracked("end_init")?;
        let mut state = self.lock_state();
        if state.init_depth == 0 {
            return Err(ModelError::EndInitWithoutBegin {
                type_name: self.type_name().to_string(),
            }
            .into());
        }
        state.init_depth -= 1;
        Ok(())
    }

    /// Commit every pending change: originals take the current values, nested tracked
    /// children accept recursively, and the changed-set empties.
    pub fn accept_changes(&self) -> crate::Result<()> {
        self.require_tracked("accept_changes")?;

        let (children, was_changed) = {
            let mut state = self.lock_state();
            if state.init_depth > 0 {
                return Err(ModelError::OperationWhileInitializing {
                    type_name: self.type_name().to_string(),
                    operation: "accept_changes",
                }
                .into());
            }

            let was_changed = !state.changed.is_empty();
            let mut children = Vec::new();
            for slot in 0..self.inner.schema.len() {
                let descriptor = self.inner.schema.descriptor(slot);
                if !descriptor.is_trackable() || !state.changed.contains(descriptor.name()) {
                    continue;
                }
                state.original[slot] = state.current[slot].clone();
                if !descriptor.is_reference_only()
                    && let Some(child) = state.current[slot].tracked_model()
                {
                    children.push(child.clone());
                }
            }
            state.changed.clear();
            (children, was_changed)
        };

        for child in children {
            child.accept_changes()?;
        }
        if was_changed {
            self.raise_names(vec![IS_CHANGED.to_string()]);
        }
        Ok(())
    }

    /// Discard every pending change: nested original children reject recursively,
    /// currents take the original values, and the changed-set empties.
    pub fn reject_changes(&self) -> crate::Result<()> {
        self.require_tracked("reject_changes")?;

        let (children, slots) = {
            let state = self.lock_state();
            if state.init_depth > 0 {
                return Err(ModelError::OperationWhileInitializing {
                    type_name: self.type_name().to_string(),
                    operation: "reject_changes",
                }
                .into());
            }

            let mut children = Vec::new();
            let mut slots = Vec::new();
            for slot in 0..self.inner.schema.len() {
                let descriptor = self.inner.schema.descriptor(slot);
                if !descriptor.is_trackable() || !state.changed.contains(descriptor.name()) {
                    continue;
                }
                if !descriptor.is_reference_only()
                    && let Some(child) = state.original[slot].tracked_model()
                {
                    children.push(child.clone());
                }
                slots.push(slot);
            }
            (children, slots)
        };

        for child in children {
            child.reject_changes()?;
        }

        let (was_changed, now_changed, restored) = {
            let mut state = self.lock_state();
            let was_changed = !state.changed.is_empty();
            let mut restored = Vec::new();
            for &slot in &slots {
                let descriptor = self.inner.schema.descriptor(slot);
                if !descriptor.is_read_only() {
                    state.current[slot] = state.original[slot].clone();
                    state.child_subs.remove(&slot);
                    self.attach_child_locked(&mut state, slot);
                }
                state.changed.remove(descriptor.name());
                restored.push(descriptor.name().to_string());
            }
            let now_changed = !state.changed.is_empty();
            (was_changed, now_changed, restored)
        };

        let mut names = Vec::new();
        if was_changed != now_changed {
            names.push(IS_CHANGED.to_string());
        }
        for name in restored {
            names.extend(self.expand_with_dependents(&name));
        }
        self.raise_names(names);
        Ok(())
    }

    /// Commit a single property's pending change: its original takes the current
    /// value and a tracked child accepts recursively. No-op when the property is not
    /// in the changed-set.
    pub fn accept_property(&self, name: &str) -> crate::Result<()> {
        self.require_tracked("accept_property")?;
        let slot = self.slot_of(name)?;
        let descriptor = self.inner.schema.descriptor(slot);

        let (child, toggled) = {
            let mut state = self.lock_state();
            if state.init_depth > 0 {
                return Err(ModelError::OperationWhileInitializing {
                    type_name: self.type_name().to_string(),
                    operation: "accept_property",
                }
                .into());
            }
            if !state.changed.contains(name) {
                (None, false)
            } else {
                state.original[slot] = state.current[slot].clone();
                let child = if descriptor.is_reference_only() {
                    None
                } else {
                    state.current[slot].tracked_model().cloned()
                };
                state.changed.remove(name);
                (child, state.changed.is_empty())
            }
        };

        if let Some(child) = child {
            child.accept_changes()?;
        }
        if toggled {
            self.raise_names(vec![IS_CHANGED.to_string()]);
        }
        Ok(())
    }

    /// Discard a single property's pending change: a tracked original child rejects
    /// recursively, then the current slot takes the original value. No-op when the
    /// property is not in the changed-set.
    pub fn reject_property(&self, name: &str) -> crate::Result<()> {
        self.require_tracked("reject_property")?;
        let slot = self.slot_of(name)?;
        let descriptor = self.inner.schema.descriptor(slot);

        let child = {
            let state = self.lock_state();
            if state.init_depth > 0 {
                return Err(ModelError::OperationWhileInitializing {
                    type_name: self.type_name().to_string(),
                    operation: "reject_property",
                }
                .into());
            }
            if !state.changed.contains(name) {
                return Ok(());
            }
            if descriptor.is_reference_only() {
                None
            } else {
                state.original[slot].tracked_model().cloned()
            }
        };

        if let Some(child) = child {
            child.reject_changes()?;
        }

        let toggled = {
            let mut state = self.lock_state();
            if !descriptor.is_read_only() {
                state.current[slot] = state.original[slot].clone();
                state.child_subs.remove(&slot);
                self.attach_child_locked(&mut state, slot);
            }
            state.changed.remove(name);
            state.changed.is_empty()
        };

        let mut names = Vec::new();
        if toggled {
            names.push(IS_CHANGED.to_string());
        }
        names.extend(self.expand_with_dependents(name));
        self.raise_names(names);
        Ok(())
    }

    /// Rewrite the original slot of a property. If the property is not currently
    /// changed, the current slot follows; if it is, the changed-set is re-evaluated
    /// against the new baseline.
    pub fn set_original_value(&self, name: &str, value: impl Into<Value>) -> crate::Result<()> {
        self.require_tracked("set_original_value")?;
        let slot = self.slot_of(name)?;
        let descriptor = self.inner.schema.descriptor(slot);
        let incoming = value.into();

        let (toggled, current_followed) = {
            let mut state = self.lock_state();
            state.original[slot] = incoming.clone();

            if state.changed.contains(name) {
                let mut different = !descriptor.values_equal(&state.current[slot], &incoming);
                if !different
                    && !descriptor.is_reference_only()
                    && let Some(child) = state.current[slot].tracked_model()
                    && !child.ptr_eq(self)
                    && child.is_changed()
                {
                    different = true;
                }
                let mut toggled = false;
                if !different {
                    state.changed.remove(name);
                    toggled = state.changed.is_empty();
                }
                (toggled, false)
            } else {
                let followed = !descriptor.values_equal(&state.current[slot], &incoming);
                if followed {
                    state.current[slot] = incoming;
                    state.child_subs.remove(&slot);
                    self.attach_child_locked(&mut state, slot);
                }
                (false, followed)
            }
        };

        let mut names = Vec::new();
        if toggled {
            names.push(IS_CHANGED.to_string());
        }
        if current_followed {
            names.extend(self.expand_with_dependents(name));
        }
        self.raise_names(names);
        Ok(())
    }

    /// Write both slots of a property and raise its change; the property leaves the
    /// changed-set.
    pub fn reset_value(&self, name: &str, value: impl Into<Value>) -> crate::Result<()> {
        self.require_tracked("reset_value")?;
        let slot = self.slot_of(name)?;
        let incoming = value.into();

        let toggled = {
            let mut state = self.lock_state();
            state.current[slot] = incoming.clone();
            state.original[slot] = incoming;
            state.child_subs.remove(&slot);
            self.attach_child_locked(&mut state, slot);

            let was_empty = state.changed.is_empty();
            state.changed.remove(name);
            was_empty != state.changed.is_empty()
        };

        let mut names = Vec::new();
        if toggled {
            names.push(IS_CHANGED.to_string());
        }
        names.extend(self.expand_with_dependents(name));
        self.raise_names(names);
        Ok(())
    }

    /// Compare this instance's originals against `other`'s current values, property by
    /// property over the trackable set. `original_equals(self)` is therefore exactly
    /// "no pending changes".
    pub fn original_equals(&self, other: &Model) -> crate::Result<bool> {
        self.require_tracked("original_equals")?;
        if !Arc::ptr_eq(&self.inner.schema, &other.inner.schema) {
            return Ok(false);
        }

        let originals = self.lock_state().original.clone();
        let currents = other.current_values();
        for slot in 0..self.inner.schema.len() {
            let descriptor = self.inner.schema.descriptor(slot);
            if !descriptor.is_trackable() {
                continue;
            }
            let equal = match (originals[slot].tracked_model(), descriptor.is_reference_only()) {
                (Some(child), false) => match currents[slot].as_model() {
                    Some(other_child) => child.original_equals(other_child)?,
                    None => false,
                },
                _ => descriptor.values_equal(&originals[slot], &currents[slot]),
            };
            if !equal {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Report every pending change as `(property, original, current)` records, in
    /// declaration order.
    pub fn get_changes(&self) -> crate::Result<Vec<ChangeRecord>> {
        self.require_tracked("get_changes")?;
        let state = self.lock_state();
        let mut records = Vec::new();
        for slot in 0..self.inner.schema.len() {
            let descriptor = self.inner.schema.descriptor(slot);
            if state.changed.contains(descriptor.name()) {
                records.push(ChangeRecord {
                    property: descriptor.name().to_string(),
                    original: state.original[slot].clone(),
                    current: state.current[slot].clone(),
                });
            }
        }
        Ok(records)
    }

    /// Report the differences between this instance's current values and `other`'s,
    /// over this instance's trackable properties. Properties `other` does not declare
    /// compare against `Null`.
    pub fn get_changes_against(&self, other: &Model) -> crate::Result<Vec<ChangeRecord>> {
        let currents = self.current_values();
        let mut records = Vec::new();
        for slot in 0..self.inner.schema.len() {
            let descriptor = self.inner.schema.descriptor(slot);
            if !descriptor.is_trackable() {
                continue;
            }
            let theirs = other.get(descriptor.name()).unwrap_or(Value::Null);
            if !descriptor.values_equal(&currents[slot], &theirs) {
                records.push(ChangeRecord {
                    property: descriptor.name().to_string(),
                    original: theirs,
                    current: currents[slot].clone(),
                });
            }
        }
        Ok(records)
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.structural_eq(other)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("type", &self.type_name())
            .field("tracked", &self.inner.tracked)
            .finish()
    }
}

/// Scoped deferral handle returned by [`Model::defer_property_changes`]. Dropping the
/// guard flushes the accumulated notifications in first-observed order.
#[must_use = "dropping the guard immediately flushes deferred notifications"]
pub struct DeferGuard {
    model: Model,
}

impl Drop for DeferGuard {
    fn drop(&mut self) {
        let pending = {
            let mut state = self.model.lock_state();
            state.pending.take().unwrap_or_default()
        };
        for name in pending {
            self.model
                .inner
                .notifier
                .raise(&PropertyChanged::new(self.model.clone(), name));
        }
    }
}

impl fmt::Debug for DeferGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferGuard")
            .field("type", &self.model.type_name())
            .finish()
    }
}
