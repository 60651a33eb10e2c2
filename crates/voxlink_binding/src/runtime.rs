//! # Foreign Runtime Seam
//!
//! The only surface through which the bridge sees Module A and Module B.
//! The host implements [`ForeignRuntime`] over whatever symbol lookup it has
//! (plugin registry, class loader, dynamic library tables). The bridge never
//! names a foreign type at compile time.
//!
//! ```text
//! ┌──────────────┐  is_module_loaded  ┌──────────────────┐
//! │   Detector   │──────────────────► │                  │
//! │              │  find_class        │  ForeignRuntime  │──► Module A / B
//! │   Resolver   │──────────────────► │   (host impl)    │
//! │              │  scan_classes      │                  │
//! └──────────────┘──────────────────► └──────────────────┘
//! ```

use std::sync::Arc;

use thiserror::Error;
use voxlink_core::{ArgShape, ForeignValue, ValueKind};

/// A callable foreign method.
pub type ForeignMethod =
    Arc<dyn Fn(&[ForeignValue]) -> Result<ForeignValue, ForeignFault> + Send + Sync>;

/// Faults raised by the foreign side or by symbol lookup.
///
/// These never leave the binding crate: the detector swallows them and the
/// resolver converts them to [`voxlink_core::BindError`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForeignFault {
    /// No class with that name is loadable.
    #[error("class not found: {0}")]
    ClassNotFound(String),

    /// The class exists but has no method with that name and shape.
    #[error("no method {name}{shape} on {class}")]
    MethodNotFound {
        /// Class that was searched.
        class: String,
        /// Method name.
        name: String,
        /// Argument shape.
        shape: ArgShape,
    },

    /// A call returned a value of the wrong kind.
    #[error("unexpected result kind {0}")]
    UnexpectedResult(ValueKind),

    /// The host's module registry could not be queried.
    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// Foreign code raised an error.
    #[error("foreign error: {0}")]
    Raised(String),
}

/// A loaded foreign class.
pub trait ForeignClass: Send + Sync {
    /// Fully-qualified class name.
    fn name(&self) -> &str;

    /// Looks up a method by name and argument shape.
    fn method(&self, name: &str, shape: &ArgShape) -> Option<ForeignMethod>;
}

/// Host-provided symbol lookup over the currently loaded modules.
pub trait ForeignRuntime: Send + Sync {
    /// Asks the host's plugin registry whether a module id is loaded.
    ///
    /// # Errors
    ///
    /// Returns a fault if the registry itself cannot be queried.
    fn is_module_loaded(&self, module_id: &str) -> Result<bool, ForeignFault>;

    /// Resolves a class by fully-qualified name.
    ///
    /// # Errors
    ///
    /// Returns [`ForeignFault::ClassNotFound`] if it is not loadable.
    fn find_class(&self, name: &str) -> Result<Arc<dyn ForeignClass>, ForeignFault>;

    /// Lists loadable class names starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns a fault if the class path cannot be enumerated.
    fn scan_classes(&self, prefix: &str) -> Result<Vec<String>, ForeignFault>;
}

/// Looks up `name` with `shape` on `class`, as a fault when missing.
///
/// # Errors
///
/// Returns [`ForeignFault::MethodNotFound`] if the class lacks the method.
pub fn require_method(
    class: &dyn ForeignClass,
    name: &str,
    shape: &ArgShape,
) -> Result<ForeignMethod, ForeignFault> {
    class
        .method(name, shape)
        .ok_or_else(|| ForeignFault::MethodNotFound {
            class: class.name().to_owned(),
            name: name.to_owned(),
            shape: shape.clone(),
        })
}

/// Boxes a closure as a [`ForeignMethod`].
pub fn foreign_method<F>(f: F) -> ForeignMethod
where
    F: Fn(&[ForeignValue]) -> Result<ForeignValue, ForeignFault> + Send + Sync + 'static,
{
    Arc::new(f)
}
