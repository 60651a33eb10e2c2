//! In-process foreign runtime for tests, benches and the smoke binary.
//!
//! Models a host with a module registry and a flat class table. Every
//! lookup and call is counted so tests can assert that cached paths never
//! touch the runtime.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use voxlink_core::{ArgShape, ForeignValue};

use crate::runtime::{foreign_method, ForeignClass, ForeignFault, ForeignMethod, ForeignRuntime};

/// A class with a fixed method table.
pub struct MockClass {
    name: String,
    methods: HashMap<(String, ArgShape), ForeignMethod>,
    invocations: Arc<AtomicU64>,
}

impl MockClass {
    /// A class with no methods.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
            invocations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Adds a method.
    #[must_use]
    pub fn with_method<F>(mut self, name: impl Into<String>, shape: ArgShape, f: F) -> Self
    where
        F: Fn(&[ForeignValue]) -> Result<ForeignValue, ForeignFault> + Send + Sync + 'static,
    {
        self.methods.insert((name.into(), shape), foreign_method(f));
        self
    }

    /// Calls made to any method of this class.
    #[must_use]
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }
}

impl ForeignClass for MockClass {
    fn name(&self) -> &str {
        &self.name
    }

    fn method(&self, name: &str, shape: &ArgShape) -> Option<ForeignMethod> {
        let inner = Arc::clone(self.methods.get(&(name.to_owned(), shape.clone()))?);
        let counter = Arc::clone(&self.invocations);
        Some(foreign_method(move |args| {
            counter.fetch_add(1, Ordering::Relaxed);
            inner(args)
        }))
    }
}

/// Mock host runtime.
#[derive(Default)]
pub struct MockRuntime {
    modules: RwLock<HashSet<String>>,
    classes: RwLock<HashMap<String, Arc<MockClass>>>,
    registry_fails: AtomicBool,
    registry_queries: AtomicU64,
    class_lookups: AtomicU64,
    scans: AtomicU64,
}

impl MockRuntime {
    /// An empty host: no modules, no classes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module id with the host registry.
    #[must_use]
    pub fn with_module(self, id: &str) -> Self {
        self.load_module(id);
        self
    }

    /// Defines a class.
    #[must_use]
    pub fn with_class(self, class: MockClass) -> Self {
        self.define_class(class);
        self
    }

    /// Registers a module id after construction.
    pub fn load_module(&self, id: &str) {
        self.modules.write().insert(id.to_owned());
    }

    /// Defines (or replaces) a class after construction.
    pub fn define_class(&self, class: MockClass) {
        self.classes
            .write()
            .insert(class.name.clone(), Arc::new(class));
    }

    /// Makes registry queries fault, to exercise strategy fallback.
    pub fn set_registry_failure(&self, fail: bool) {
        self.registry_fails.store(fail, Ordering::Relaxed);
    }

    /// Number of `is_module_loaded` calls.
    #[must_use]
    pub fn registry_queries(&self) -> u64 {
        self.registry_queries.load(Ordering::Relaxed)
    }

    /// Number of `find_class` calls.
    #[must_use]
    pub fn class_lookups(&self) -> u64 {
        self.class_lookups.load(Ordering::Relaxed)
    }

    /// Number of `scan_classes` calls.
    #[must_use]
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Calls made to any method of any class whose name starts with `prefix`.
    #[must_use]
    pub fn invocations_under(&self, prefix: &str) -> u64 {
        self.classes
            .read()
            .values()
            .filter(|c| c.name.starts_with(prefix))
            .map(|c| c.invocations())
            .sum()
    }
}

impl ForeignRuntime for MockRuntime {
    fn is_module_loaded(&self, module_id: &str) -> Result<bool, ForeignFault> {
        self.registry_queries.fetch_add(1, Ordering::Relaxed);
        if self.registry_fails.load(Ordering::Relaxed) {
            return Err(ForeignFault::RegistryUnavailable("mock registry offline".into()));
        }
        Ok(self.modules.read().contains(module_id))
    }

    fn find_class(&self, name: &str) -> Result<Arc<dyn ForeignClass>, ForeignFault> {
        self.class_lookups.fetch_add(1, Ordering::Relaxed);
        self.classes
            .read()
            .get(name)
            .map(|c| Arc::clone(c) as Arc<dyn ForeignClass>)
            .ok_or_else(|| ForeignFault::ClassNotFound(name.to_owned()))
    }

    fn scan_classes(&self, prefix: &str) -> Result<Vec<String>, ForeignFault> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        let mut names: Vec<String> = self
            .classes
            .read()
            .keys()
            .filter(|n| n.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_calls_are_counted() {
        let runtime = MockRuntime::new().with_class(MockClass::new("a.B").with_method(
            "m",
            ArgShape::default(),
            |_| Ok(ForeignValue::Unit),
        ));
        let class = runtime.find_class("a.B").unwrap();
        let m = class.method("m", &ArgShape::default()).unwrap();
        m(&[]).unwrap();
        m(&[]).unwrap();
        assert_eq!(runtime.invocations_under("a."), 2);
        assert_eq!(runtime.invocations_under("z."), 0);
        assert_eq!(runtime.class_lookups(), 1);
    }

    #[test]
    fn test_scan_is_sorted_and_filtered() {
        let runtime = MockRuntime::new()
            .with_class(MockClass::new("p.Z"))
            .with_class(MockClass::new("p.A"))
            .with_class(MockClass::new("q.A"));
        assert_eq!(runtime.scan_classes("p.").unwrap(), vec!["p.A", "p.Z"]);
    }

    #[test]
    fn test_registry_failure() {
        let runtime = MockRuntime::new().with_module("x");
        assert_eq!(runtime.is_module_loaded("x"), Ok(true));
        runtime.set_registry_failure(true);
        assert!(runtime.is_module_loaded("x").is_err());
        assert_eq!(runtime.registry_queries(), 2);
    }
}
