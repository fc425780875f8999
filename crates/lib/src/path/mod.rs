//! Validated property paths and path observation.
//!
//! A property path is a dotted chain of property names (`"mother.address.city"`)
//! evaluated against a root model. The [`Path`]/[`PathBuf`] pair follows the same
//! borrowed/owned pattern as `std::path::Path`/`PathBuf`; components are validated on
//! construction. Parsed paths are cached process-wide, keyed by the path string, so
//! repeated observation of the same chain re-uses the compiled form.
//!
//! [`PathObserver`] subscribes along the chain and republishes the terminal value; see
//! [`observer`].

pub mod errors;
mod observer;
#[cfg(test)]
mod tests;

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::{Arc, OnceLock, RwLock};

pub use errors::PathError;
pub use observer::{PathObserver, observe};

/// One step of a property path. A step names a property, so it obeys the same rule
/// schemas enforce on property names: non-empty and dot-free.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Component {
    inner: String,
}

impl Component {
    /// Validate a single property name for use as a path step.
    pub fn new(name: impl Into<String>) -> Result<Self, PathError> {
        let name = name.into();
        if is_property_name(&name) {
            Ok(Component { inner: name })
        } else {
            Err(PathError::InvalidComponent {
                component: name,
                reason: "a path step must be a non-empty property name without dots".to_string(),
            })
        }
    }

    /// The property name this step refers to.
    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

/// The rule a string must satisfy to name a property inside a path.
fn is_property_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('.')
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl FromStr for Component {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Component::new(s)
    }
}

/// An owned, validated property path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathBuf {
    inner: String,
}

/// A borrowed, validated property path. Unsized; always used behind a reference.
#[derive(Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Path {
    inner: str,
}

impl PathBuf {
    /// An empty path.
    pub fn new() -> Self {
        PathBuf {
            inner: String::new(),
        }
    }

    /// Parse and validate a dotted path string.
    pub fn parse(path: impl AsRef<str>) -> Result<Self, PathError> {
        let path = path.as_ref();
        Path::validate(path)?;
        Ok(PathBuf {
            inner: path.to_string(),
        })
    }

    /// Append a step, validating it. The path is re-rendered from its step sequence,
    /// so an empty path and a populated one extend the same way.
    pub fn push(self, name: impl Into<String>) -> Result<Self, PathError> {
        let step = Component::new(name)?;
        let steps: Vec<&str> = self
            .components()
            .chain(std::iter::once(step.as_str()))
            .collect();
        Ok(PathBuf {
            inner: steps.join("."),
        })
    }

    /// Borrow as a [`Path`].
    pub fn as_path(&self) -> &Path {
        Path::new_unchecked(&self.inner)
    }
}

impl Default for PathBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for PathBuf {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PathBuf::parse(s)
    }
}

impl Deref for PathBuf {
    type Target = Path;

    fn deref(&self) -> &Path {
        self.as_path()
    }
}

impl AsRef<Path> for PathBuf {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}

impl Borrow<Path> for PathBuf {
    fn borrow(&self) -> &Path {
        self.as_path()
    }
}

impl fmt::Display for PathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl Path {
    fn new_unchecked(s: &str) -> &Path {
        // SAFETY: Path is a #[repr(transparent)] wrapper around str.
        unsafe { &*(s as *const str as *const Path) }
    }

    /// Validate and borrow a dotted path string.
    pub fn new(s: &str) -> Result<&Path, PathError> {
        Path::validate(s)?;
        Ok(Path::new_unchecked(s))
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Iterate the component names.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.inner.split('.').filter(|c| !c.is_empty())
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components().count()
    }

    /// Whether the path has no components.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// A dotted path is valid when every slot between dots is a property name.
    /// The first empty slot decides the error: at the front it is a leading dot, at
    /// the back a trailing dot, anywhere else a doubled dot.
    fn validate(path: &str) -> Result<(), PathError> {
        if path.is_empty() {
            return Err(PathError::EmptyPath);
        }
        let slots: Vec<&str> = path.split('.').collect();
        match slots.iter().copied().position(|slot| !is_property_name(slot)) {
            None => Ok(()),
            Some(0) => Err(PathError::LeadingDot),
            Some(position) if position == slots.len() - 1 => Err(PathError::TrailingDot),
            Some(position) => Err(PathError::EmptyComponent { position }),
        }
    }
}

impl ToOwned for Path {
    type Owned = PathBuf;

    fn to_owned(&self) -> PathBuf {
        PathBuf {
            inner: self.inner.to_string(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.inner)
    }
}

type PathCache = RwLock<HashMap<String, Arc<PathBuf>>>;

static PATH_CACHE: OnceLock<PathCache> = OnceLock::new();

/// Parse a dotted path through the process-wide cache. Repeated observation of the
/// same chain re-uses the compiled path.
pub fn parse_cached(path: &str) -> Result<Arc<PathBuf>, PathError> {
    let cache = PATH_CACHE.get_or_init(|| RwLock::new(HashMap::new()));
    if let Some(parsed) = cache.read().expect("path cache poisoned").get(path) {
        return Ok(parsed.clone());
    }

    let parsed = Arc::new(PathBuf::parse(path)?);
    let mut map = cache.write().expect("path cache poisoned");
    Ok(map.entry(path.to_string()).or_insert(parsed).clone())
}
