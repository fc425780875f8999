//! Property schemas: per-type dictionaries of property descriptors.
//!
//! A domain type declares its properties by implementing [`ModelType`]; the declaration
//! is compiled into a [`Schema`] the first time the type is observed and cached
//! process-wide. Compilation failures are cached too, so every subsequent factory call
//! for the broken type re-raises the same error.
//!
//! Schemas also own the dependency graph between properties. Raising a change for a
//! property fans out to its transitive dependents, breadth-first, memoized per
//! property name. A property that transitively depends on itself is removed from its
//! own fan-out set, with a warning.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, OnceLock, RwLock};

use tracing::warn;

use super::SchemaError;
use super::value::Value;
use crate::constants;

/// Descriptor of a single declared property.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    name: String,
    default: Value,
    trackable: bool,
    reference_only: bool,
    read_only: bool,
    depends_on: Vec<String>,
}

impl PropertyDescriptor {
    /// The declared property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value a fresh instance starts with.
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// Whether the property participates in original/current shadow tracking.
    pub fn is_trackable(&self) -> bool {
        self.trackable
    }

    /// Whether comparisons use handle identity and nested tracking is skipped.
    pub fn is_reference_only(&self) -> bool {
        self.reference_only
    }

    /// Whether the property has no setter.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Properties this one is declared to be a function of.
    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    /// Structural-or-identity comparison per this property's discipline.
    pub(crate) fn values_equal(&self, a: &Value, b: &Value) -> bool {
        if self.reference_only {
            a.same_identity(b)
        } else {
            a == b
        }
    }
}

/// Declaration handle returned by [`SchemaBuilder::property`]; chain option calls on it.
#[derive(Debug)]
pub struct PropertyDecl {
    descriptor: PropertyDescriptor,
}

impl PropertyDecl {
    /// Set the value a fresh instance starts with (defaults to `Value::Null`).
    pub fn default_value(&mut self, value: impl Into<Value>) -> &mut Self {
        self.descriptor.default = value.into();
        self
    }

    /// Mark the property as participating in original/current tracking.
    pub fn trackable(&mut self) -> &mut Self {
        self.descriptor.trackable = true;
        self
    }

    /// Track by handle identity only; nested changes of the value are not observed.
    pub fn reference_only(&mut self) -> &mut Self {
        self.descriptor.trackable = true;
        self.descriptor.reference_only = true;
        self
    }

    /// Declare the property as having no setter. The slot is seeded from the default
    /// value (or the factory builder) and mutated only through its nested value.
    pub fn read_only(&mut self) -> &mut Self {
        self.descriptor.read_only = true;
        self
    }

    /// Declare that this property is a function of the listed ones.
    pub fn depends_on(&mut self, names: &[&str]) -> &mut Self {
        self.descriptor
            .depends_on
            .extend(names.iter().map(|n| n.to_string()));
        self
    }
}

/// Fluent builder passed to [`ModelType::declare`].
#[derive(Debug)]
pub struct SchemaBuilder {
    type_name: &'static str,
    decls: Vec<PropertyDecl>,
}

impl SchemaBuilder {
    pub(crate) fn new(type_name: &'static str) -> Self {
        SchemaBuilder {
            type_name,
            decls: Vec::new(),
        }
    }

    /// The type name being declared.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Declare a property. Returns a handle for chaining option calls.
    pub fn property(&mut self, name: impl Into<String>) -> &mut PropertyDecl {
        self.decls.push(PropertyDecl {
            descriptor: PropertyDescriptor {
                name: name.into(),
                default: Value::Null,
                trackable: false,
                reference_only: false,
                read_only: false,
                depends_on: Vec::new(),
            },
        });
        self.decls.last_mut().expect("declaration just pushed")
    }

    /// Merge a shared declaration block into this schema.
    ///
    /// This is how property sets common to several types (including their dependency
    /// declarations) are composed; the merged properties keep their relative
    /// declaration order.
    pub fn extend(&mut self, block: impl FnOnce(&mut SchemaBuilder)) -> &mut Self {
        block(self);
        self
    }

    pub(crate) fn build(self) -> Result<Schema, SchemaError> {
        let type_name = self.type_name;
        let properties: Vec<PropertyDescriptor> =
            self.decls.into_iter().map(|d| d.descriptor).collect();

        let reserved = [
            constants::IS_CHANGED,
            constants::COUNT,
            constants::ITEM,
            constants::FIRST,
            constants::LAST,
            constants::IS_EMPTY,
            constants::VALUE,
        ];

        let mut index = HashMap::new();
        for (slot, property) in properties.iter().enumerate() {
            let name = property.name.as_str();
            if name.is_empty() || name.contains('.') {
                return Err(SchemaError::InvalidPropertyName {
                    type_name: type_name.to_string(),
                    property: name.to_string(),
                    reason: "property names must be non-empty and must not contain dots"
                        .to_string(),
                });
            }
            if reserved.contains(&name) {
                return Err(SchemaError::ReservedProperty {
                    type_name: type_name.to_string(),
                    property: name.to_string(),
                });
            }
            if index.insert(name.to_string(), slot).is_some() {
                return Err(SchemaError::DuplicateProperty {
                    type_name: type_name.to_string(),
                    property: name.to_string(),
                });
            }
        }

        // Reverse the declared dependency edges: direct_dependents[p] lists every
        // property that declared `depends_on(p)`, in declaration order.
        let mut direct_dependents: HashMap<String, Vec<String>> = HashMap::new();
        for property in &properties {
            for target in &property.depends_on {
                if !index.contains_key(target) {
                    return Err(SchemaError::UnknownDependency {
                        type_name: type_name.to_string(),
                        property: property.name.clone(),
                        depends_on: target.clone(),
                    });
                }
                direct_dependents
                    .entry(target.clone())
                    .or_default()
                    .push(property.name.clone());
            }
        }

        Ok(Schema {
            type_name,
            properties,
            index,
            direct_dependents,
            dependents_memo: RwLock::new(HashMap::new()),
        })
    }
}

/// A compiled per-type property dictionary, in declaration order.
#[derive(Debug)]
pub struct Schema {
    type_name: &'static str,
    properties: Vec<PropertyDescriptor>,
    index: HashMap<String, usize>,
    direct_dependents: HashMap<String, Vec<String>>,
    dependents_memo: RwLock<HashMap<String, Arc<[String]>>>,
}

impl Schema {
    /// The declared type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Number of declared properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the schema declares no properties.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Descriptors in declaration order.
    pub fn properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter()
    }

    /// Look up a descriptor by name.
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.index.get(name).map(|slot| &self.properties[*slot])
    }

    pub(crate) fn slot_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn descriptor(&self, slot: usize) -> &PropertyDescriptor {
        &self.properties[slot]
    }

    /// The transitive dependents of `name`, breadth-first, memoized.
    ///
    /// `name` itself never appears in the result; a property that transitively
    /// depends on itself is reported once with a warning.
    pub(crate) fn dependents_of(&self, name: &str) -> Arc<[String]> {
        if let Some(cached) = self
            .dependents_memo
            .read()
            .expect("dependents memo poisoned")
            .get(name)
        {
            return cached.clone();
        }

        let mut result: Vec<String> = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(name);
        let mut queue: VecDeque<&str> = VecDeque::new();
        if let Some(direct) = self.direct_dependents.get(name) {
            queue.extend(direct.iter().map(String::as_str));
        }

        while let Some(next) = queue.pop_front() {
            if next == name {
                warn!(
                    type_name = self.type_name,
                    property = name,
                    "property transitively depends on itself; self-edge removed from fan-out"
                );
                continue;
            }
            if !visited.insert(next) {
                continue;
            }
            result.push(next.to_string());
            if let Some(direct) = self.direct_dependents.get(next) {
                queue.extend(direct.iter().map(String::as_str));
            }
        }

        let computed: Arc<[String]> = result.into();
        let mut memo = self
            .dependents_memo
            .write()
            .expect("dependents memo poisoned");
        memo.entry(name.to_string()).or_insert(computed).clone()
    }
}

/// Declares the property schema of a domain type.
///
/// ```
/// use telltale::model::{ModelType, SchemaBuilder};
///
/// struct Person;
///
/// impl ModelType for Person {
///     const NAME: &'static str = "Person";
///
///     fn declare(schema: &mut SchemaBuilder) {
///         schema.property("name").trackable().default_value("");
///         schema.property("age").trackable().default_value(0i64);
///         schema.property("mother").trackable();
///         schema.property("mother_age").depends_on(&["mother"]);
///     }
/// }
/// ```
pub trait ModelType: 'static {
    /// The unique type name registered for this declaration.
    const NAME: &'static str;

    /// Declare the type's properties on the builder.
    fn declare(schema: &mut SchemaBuilder);
}

type Registry = RwLock<HashMap<&'static str, Result<Arc<Schema>, SchemaError>>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Compile-or-fetch the schema for `T`. The first observation of a type compiles and
/// publishes its schema (or its failure) under the registry lock; later observations
/// are read-only lookups.
pub(crate) fn schema_of<T: ModelType>() -> Result<Arc<Schema>, SchemaError> {
    if let Some(entry) = registry()
        .read()
        .expect("schema registry poisoned")
        .get(T::NAME)
    {
        return entry.clone();
    }

    let mut builder = SchemaBuilder::new(T::NAME);
    T::declare(&mut builder);
    let compiled = builder.build().map(Arc::new);

    let mut map = registry().write().expect("schema registry poisoned");
    map.entry(T::NAME).or_insert(compiled).clone()
}
