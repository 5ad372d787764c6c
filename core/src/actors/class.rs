use super::Actor;
use crate::{
    messaging::{satisfies, Capabilities, Requirements},
    sources::SourceHash,
};
use bytes::Bytes;
use rustc_hash::FxHashMap;
use std::{fmt, sync::Arc};

/// A kind of actor the system knows how to create
pub trait ActorClass: Send + Sync {
    /// The stable name creation requests refer to
    fn class_name(&self) -> &str;

    /// Decide whether a system with `capabilities` may host this class
    ///
    /// By default every requirement has to be advertised with an equal value.
    fn compatible(&self, capabilities: &Capabilities, requirements: Option<&Requirements>) -> bool {
        requirements
            .map(|reqs| satisfies(capabilities, reqs))
            .unwrap_or(true)
    }

    /// Create a fresh instance
    fn instantiate(&self) -> Result<Box<dyn Actor>, String>;
}

impl fmt::Debug for dyn ActorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorClass({})", self.class_name())
    }
}

/// An [ActorClass](ActorClass) backed by a constructor function
pub struct SimpleClass<F> {
    name: String,
    factory: F,
}

impl<F> SimpleClass<F>
where
    F: Fn() -> Box<dyn Actor> + Send + Sync + 'static,
{
    pub fn new<S: Into<String>>(name: S, factory: F) -> Self {
        SimpleClass {
            name: name.into(),
            factory,
        }
    }

    /// Wrap into the form [ClassRegistry::register](ClassRegistry::register) takes
    pub fn shared(self) -> Arc<dyn ActorClass> {
        Arc::new(self)
    }
}

impl<F> ActorClass for SimpleClass<F>
where
    F: Fn() -> Box<dyn Actor> + Send + Sync + 'static,
{
    fn class_name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self) -> Result<Box<dyn Actor>, String> {
        Ok((self.factory)())
    }
}

/// The classes available without loading any source
#[derive(Clone, Default)]
pub struct ClassRegistry {
    classes: FxHashMap<String, Arc<dyn ActorClass>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        ClassRegistry::default()
    }

    /// Add `class`, replacing any class of the same name
    pub fn register(&mut self, class: Arc<dyn ActorClass>) {
        self.classes.insert(class.class_name().to_string(), class);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActorClass>> {
        self.classes.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Turns validated source blobs into actor classes
pub trait ModuleProvider: Send + Sync {
    /// Produce `class_name` from the source loaded under `hash`
    fn load(&self, hash: &SourceHash, source: &Bytes, class_name: &str) -> Result<Arc<dyn ActorClass>, String>;
}
