//! Named user functions and the registry used to re-link them.
//!
//! Steps never hold anonymous closures. Every user function is wrapped in a
//! [`Named`] handle carrying a stable identifier; a serialized pipeline stores
//! only that identifier, and [`FnRegistry`] resolves it again on load.
//!
//! ```
//! use ironpipe::{Element, FnRegistry, MapFn, PredicateFn};
//!
//! let square = MapFn::new("square", |e: Element| {
//!     let v = e.as_i64().ok_or_else(|| anyhow::anyhow!("expected int"))?;
//!     Ok(Element::Int(v * v))
//! });
//! let even = PredicateFn::new("even", |e: &Element| Ok(e.as_i64().unwrap_or(1) % 2 == 0));
//!
//! let registry = FnRegistry::new().with_map(square).with_predicate(even);
//! assert!(registry.map("square").is_ok());
//! assert!(registry.map("cube").is_err());
//! ```

use crate::element::Element;
use crate::error::{Error, Result};
use crate::source::ElementStream;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type MapBody = dyn Fn(Element) -> anyhow::Result<Element> + Send + Sync;
pub type PredicateBody = dyn Fn(&Element) -> anyhow::Result<bool> + Send + Sync;
pub type FlatMapBody = dyn Fn(Element) -> anyhow::Result<Vec<Element>> + Send + Sync;
pub type StreamBody = dyn Fn(ElementStream) -> ElementStream + Send + Sync;

/// A function paired with the identifier it is serialized under.
pub struct Named<F: ?Sized> {
    name: Arc<str>,
    body: Arc<F>,
}

impl<F: ?Sized> Named<F> {
    /// The identifier this function is registered and serialized under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn body(&self) -> &F {
        &self.body
    }
}

impl<F: ?Sized> Clone for Named<F> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            body: Arc::clone(&self.body),
        }
    }
}

impl<F: ?Sized> fmt::Debug for Named<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Named({})", self.name)
    }
}

/// Element-to-element function used by `map` and `map_parallel`.
pub type MapFn = Named<MapBody>;
/// Predicate used by `filter` and `filter_parallel`.
pub type PredicateFn = Named<PredicateBody>;
/// Element-to-many function used by `flat_map` and `flat_map_parallel`.
pub type FlatMapFn = Named<FlatMapBody>;
/// Whole-stream function used by `apply`.
pub type StreamFn = Named<StreamBody>;

impl Named<MapBody> {
    pub fn new<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Element) -> anyhow::Result<Element> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(f),
        }
    }
}

impl Named<PredicateBody> {
    pub fn new<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(&Element) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(f),
        }
    }
}

impl Named<FlatMapBody> {
    pub fn new<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Element) -> anyhow::Result<Vec<Element>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(f),
        }
    }
}

impl Named<StreamBody> {
    pub fn new<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(ElementStream) -> ElementStream + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(f),
        }
    }
}

/// Lookup table from function identifiers to handles.
///
/// Each function kind has its own namespace, so a map and a predicate may share
/// a name.
#[derive(Clone, Default)]
pub struct FnRegistry {
    maps: HashMap<String, MapFn>,
    predicates: HashMap<String, PredicateFn>,
    flat_maps: HashMap<String, FlatMapFn>,
    streams: HashMap<String, StreamFn>,
}

impl FnRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_map(&mut self, f: MapFn) -> &mut Self {
        self.maps.insert(f.name().to_string(), f);
        self
    }

    pub fn register_predicate(&mut self, f: PredicateFn) -> &mut Self {
        self.predicates.insert(f.name().to_string(), f);
        self
    }

    pub fn register_flat_map(&mut self, f: FlatMapFn) -> &mut Self {
        self.flat_maps.insert(f.name().to_string(), f);
        self
    }

    pub fn register_stream(&mut self, f: StreamFn) -> &mut Self {
        self.streams.insert(f.name().to_string(), f);
        self
    }

    #[must_use]
    pub fn with_map(mut self, f: MapFn) -> Self {
        self.register_map(f);
        self
    }

    #[must_use]
    pub fn with_predicate(mut self, f: PredicateFn) -> Self {
        self.register_predicate(f);
        self
    }

    #[must_use]
    pub fn with_flat_map(mut self, f: FlatMapFn) -> Self {
        self.register_flat_map(f);
        self
    }

    #[must_use]
    pub fn with_stream(mut self, f: StreamFn) -> Self {
        self.register_stream(f);
        self
    }

    /// Resolve a map function by name.
    ///
    /// # Errors
    /// [`Error::Serialization`] if no map function is registered under `name`.
    pub fn map(&self, name: &str) -> Result<MapFn> {
        lookup(&self.maps, "map", name)
    }

    /// Resolve a predicate by name.
    ///
    /// # Errors
    /// [`Error::Serialization`] if no predicate is registered under `name`.
    pub fn predicate(&self, name: &str) -> Result<PredicateFn> {
        lookup(&self.predicates, "predicate", name)
    }

    /// Resolve a flat-map function by name.
    ///
    /// # Errors
    /// [`Error::Serialization`] if no flat-map function is registered under `name`.
    pub fn flat_map(&self, name: &str) -> Result<FlatMapFn> {
        lookup(&self.flat_maps, "flat_map", name)
    }

    /// Resolve a stream function by name.
    ///
    /// # Errors
    /// [`Error::Serialization`] if no stream function is registered under `name`.
    pub fn stream(&self, name: &str) -> Result<StreamFn> {
        lookup(&self.streams, "stream", name)
    }

    /// Total number of registered functions across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.len() + self.predicates.len() + self.flat_maps.len() + self.streams.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lookup<F: ?Sized>(table: &HashMap<String, Named<F>>, kind: &str, name: &str) -> Result<Named<F>> {
    table
        .get(name)
        .cloned()
        .ok_or_else(|| Error::serialization(format!("unknown {kind} function `{name}`")))
}
