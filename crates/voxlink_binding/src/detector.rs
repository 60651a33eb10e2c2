//! # Capability Detector
//!
//! Decides, once per process, whether each foreign module is loaded.
//!
//! ```text
//! detect(module)
//!    │
//!    ├── cached? ──────────────────────────────► DependencyHandle
//!    │
//!    └── 1. RegistryQuery      ── hit ──┐
//!        2. KnownClassProbe    ── hit ──┼──► present = true
//!        3. PackagePrefixScan  ── hit ──┘
//!                 │
//!                 └── all miss ──────────────► present = false
//! ```
//!
//! A strategy that faults or panics counts as a miss. Only exhausting every
//! strategy yields an absent handle, and an absent module is not an error.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, info};
use voxlink_core::{
    category, BridgeConfig, DiagnosticsThrottle, ForeignObjectKind, ModuleDescriptor, ModuleId,
};

use crate::binding::panic_message;
use crate::runtime::{ForeignFault, ForeignRuntime};

/// Version hints discovered during detection (free-form).
pub type VersionHints = BTreeMap<String, String>;

/// Which detection strategy found a module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DetectionStrategyKind {
    /// The host's plugin registry listed a known module id.
    RegistryQuery,
    /// A known fully-qualified class name resolved.
    KnownClassProbe,
    /// Some class under the module's namespace prefix is loadable.
    PackagePrefixScan,
}

impl fmt::Display for DetectionStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RegistryQuery => "registry-query",
            Self::KnownClassProbe => "known-class-probe",
            Self::PackagePrefixScan => "package-prefix-scan",
        })
    }
}

/// Detection outcome for one module. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyHandle {
    /// The module this handle describes.
    pub module: ModuleId,
    /// Whether the module is loaded.
    pub present: bool,
    /// Strategy that found it; `None` when absent.
    pub strategy: Option<DetectionStrategyKind>,
    /// Discovered details, e.g. the class name that matched.
    pub version_hints: VersionHints,
}

impl DependencyHandle {
    /// A handle for a module no strategy could find.
    #[must_use]
    pub fn absent(module: ModuleId) -> Self {
        Self {
            module,
            present: false,
            strategy: None,
            version_hints: VersionHints::new(),
        }
    }
}

/// One independent way of detecting a module.
pub trait DetectionStrategy: Send + Sync {
    /// Identifies the strategy in handles and logs.
    fn kind(&self) -> DetectionStrategyKind;

    /// Returns `Some(hints)` if the module was found, `None` if not.
    ///
    /// # Errors
    ///
    /// Any fault is treated by the detector as a miss.
    fn probe(
        &self,
        runtime: &dyn ForeignRuntime,
        descriptor: &ModuleDescriptor,
    ) -> Result<Option<VersionHints>, ForeignFault>;
}

/// Strategy 1: ask the host's registry for a known module id.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryQuery;

impl DetectionStrategy for RegistryQuery {
    fn kind(&self) -> DetectionStrategyKind {
        DetectionStrategyKind::RegistryQuery
    }

    fn probe(
        &self,
        runtime: &dyn ForeignRuntime,
        descriptor: &ModuleDescriptor,
    ) -> Result<Option<VersionHints>, ForeignFault> {
        for id in &descriptor.registry_ids {
            if runtime.is_module_loaded(id)? {
                let mut hints = VersionHints::new();
                hints.insert("registry_id".into(), id.clone());
                return Ok(Some(hints));
            }
        }
        Ok(None)
    }
}

/// Strategy 2: probe class names from known historical releases.
#[derive(Debug, Default, Clone, Copy)]
pub struct KnownClassProbe;

impl DetectionStrategy for KnownClassProbe {
    fn kind(&self) -> DetectionStrategyKind {
        DetectionStrategyKind::KnownClassProbe
    }

    fn probe(
        &self,
        runtime: &dyn ForeignRuntime,
        descriptor: &ModuleDescriptor,
    ) -> Result<Option<VersionHints>, ForeignFault> {
        for name in &descriptor.known_classes {
            // A missing class is the normal negative here, keep probing.
            if let Ok(class) = runtime.find_class(name) {
                let mut hints = VersionHints::new();
                hints.insert("class".into(), class.name().to_owned());
                return Ok(Some(hints));
            }
        }
        Ok(None)
    }
}

/// Strategy 3: look for any loadable class under the module's namespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct PackagePrefixScan;

impl DetectionStrategy for PackagePrefixScan {
    fn kind(&self) -> DetectionStrategyKind {
        DetectionStrategyKind::PackagePrefixScan
    }

    fn probe(
        &self,
        runtime: &dyn ForeignRuntime,
        descriptor: &ModuleDescriptor,
    ) -> Result<Option<VersionHints>, ForeignFault> {
        for prefix in &descriptor.package_prefixes {
            let found = runtime.scan_classes(prefix)?;
            if let Some(first) = found.first() {
                let mut hints = VersionHints::new();
                hints.insert("prefix".into(), prefix.clone());
                hints.insert("sample_class".into(), first.clone());
                hints.insert("class_count".into(), found.len().to_string());
                return Ok(Some(hints));
            }
        }
        Ok(None)
    }
}

/// The built-in strategies in priority order.
#[must_use]
pub fn default_strategies() -> Vec<Box<dyn DetectionStrategy>> {
    vec![
        Box::new(RegistryQuery),
        Box::new(KnownClassProbe),
        Box::new(PackagePrefixScan),
    ]
}

/// Memoising module detector.
pub struct CapabilityDetector {
    runtime: Arc<dyn ForeignRuntime>,
    descriptors: [ModuleDescriptor; 2],
    strategies: Vec<Box<dyn DetectionStrategy>>,
    handles: [OnceLock<Arc<DependencyHandle>>; 2],
    kinds: RwLock<HashMap<String, ForeignObjectKind>>,
    throttle: Arc<DiagnosticsThrottle>,
    runs: AtomicU64,
}

impl CapabilityDetector {
    /// Creates a detector with the built-in strategies.
    #[must_use]
    pub fn new(
        runtime: Arc<dyn ForeignRuntime>,
        config: &BridgeConfig,
        throttle: Arc<DiagnosticsThrottle>,
    ) -> Self {
        Self::with_strategies(runtime, config, throttle, default_strategies())
    }

    /// Creates a detector with a custom strategy list (tried in order).
    #[must_use]
    pub fn with_strategies(
        runtime: Arc<dyn ForeignRuntime>,
        config: &BridgeConfig,
        throttle: Arc<DiagnosticsThrottle>,
        strategies: Vec<Box<dyn DetectionStrategy>>,
    ) -> Self {
        Self {
            runtime,
            descriptors: [
                config.descriptor(ModuleId::Assembly).clone(),
                config.descriptor(ModuleId::MicroVoxel).clone(),
            ],
            strategies,
            handles: [OnceLock::new(), OnceLock::new()],
            kinds: RwLock::new(HashMap::new()),
            throttle,
            runs: AtomicU64::new(0),
        }
    }

    /// Detection result for `module`. The first caller runs the strategies;
    /// every later caller gets the same handle.
    pub fn detect(&self, module: ModuleId) -> Arc<DependencyHandle> {
        Arc::clone(self.handles[module.index()].get_or_init(|| Arc::new(self.run(module))))
    }

    /// The handle if detection already ran, without triggering it.
    #[must_use]
    pub fn peek(&self, module: ModuleId) -> Option<Arc<DependencyHandle>> {
        self.handles[module.index()].get().cloned()
    }

    /// Shorthand for `detect(module).present`.
    #[inline]
    pub fn is_present(&self, module: ModuleId) -> bool {
        self.detect(module).present
    }

    /// True when both modules are loaded, i.e. the bridge has work to do.
    pub fn both_present(&self) -> bool {
        ModuleId::ALL.iter().all(|m| self.is_present(*m))
    }

    /// Number of times the strategy list has been run (one per module at most).
    #[must_use]
    pub fn detection_runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// Classifies a foreign class name by the namespaces of present modules.
    /// Memoised per class name.
    pub fn classify(&self, class_name: &str) -> ForeignObjectKind {
        if let Some(kind) = self.kinds.read().get(class_name) {
            return *kind;
        }
        let kind = ModuleId::ALL
            .iter()
            .copied()
            .find(|m| self.descriptors[m.index()].owns_class(class_name) && self.is_present(*m))
            .map_or(ForeignObjectKind::Unknown, ForeignObjectKind::for_module);
        self.kinds.write().insert(class_name.to_owned(), kind);
        kind
    }

    fn run(&self, module: ModuleId) -> DependencyHandle {
        self.runs.fetch_add(1, Ordering::Relaxed);
        let descriptor = &self.descriptors[module.index()];

        for strategy in &self.strategies {
            let kind = strategy.kind();
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                strategy.probe(self.runtime.as_ref(), descriptor)
            }));
            match outcome {
                Ok(Ok(Some(hints))) => {
                    info!(module = %module, strategy = %kind, ?hints, "foreign module detected");
                    return DependencyHandle {
                        module,
                        present: true,
                        strategy: Some(kind),
                        version_hints: hints,
                    };
                }
                Ok(Ok(None)) => {
                    debug!(module = %module, strategy = %kind, "strategy found nothing");
                }
                Ok(Err(fault)) => {
                    if self.throttle.should_emit(category::DETECTION) {
                        debug!(module = %module, strategy = %kind, %fault, "detection strategy failed");
                    }
                }
                Err(payload) => {
                    if self.throttle.should_emit(category::DETECTION) {
                        debug!(
                            module = %module,
                            strategy = %kind,
                            panic = %panic_message(&*payload),
                            "detection strategy panicked"
                        );
                    }
                }
            }
        }

        info!(module = %module, "foreign module not present, bridge side inactive");
        DependencyHandle::absent(module)
    }
}

impl fmt::Debug for CapabilityDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDetector")
            .field("strategies", &self.strategies.len())
            .field("assembly", &self.peek(ModuleId::Assembly))
            .field("micro_voxel", &self.peek(ModuleId::MicroVoxel))
            .finish_non_exhaustive()
    }
}
