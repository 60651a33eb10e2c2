//! # Binding Resolver & Cache
//!
//! Converts expensive trial-and-error symbol lookup into an O(1) map hit.
//!
//! ```text
//! resolve(key)
//!    │
//!    ├── cache hit ─────────────────────────────────► Arc<ResolvedBinding>
//!    │
//!    ├── module absent ─────────────────────────────► ModuleAbsent
//!    │
//!    └── candidate 1 ─ fail ─► candidate 2 ─ ok ─► insert-if-absent ─► binding
//!                                   │
//!                                   └─ all fail ────► NoCandidateMatched (not cached)
//! ```
//!
//! ## Concurrency
//!
//! The render and tick threads may resolve the same key at the same time.
//! Both run the candidates; the first insert wins and both callers receive
//! the stored binding, so the cache never holds two entries for one key.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};
use voxlink_core::{
    category, BindError, BindResult, CapabilityKey, DiagnosticsThrottle, ForeignValue, RenderBox,
};

use crate::binding::{panic_message, ResolvedBinding};
use crate::candidate::{Candidate, CandidateCatalog};
use crate::detector::CapabilityDetector;
use crate::runtime::ForeignRuntime;

/// Resolver counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// `resolve` calls answered from the cache.
    pub hits: u64,
    /// `resolve` calls that missed the cache.
    pub misses: u64,
    /// Misses that ended with a new binding.
    pub resolved: u64,
    /// Misses where every candidate failed.
    pub failed: u64,
    /// Misses rejected because the module is absent.
    pub absent: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    resolved: AtomicU64,
    failed: AtomicU64,
    absent: AtomicU64,
}

/// Resolves capabilities to bindings and memoises the winners.
pub struct BindingResolver {
    detector: Arc<CapabilityDetector>,
    runtime: Arc<dyn ForeignRuntime>,
    catalog: RwLock<CandidateCatalog>,
    cache: DashMap<CapabilityKey, Arc<ResolvedBinding>>,
    throttle: Arc<DiagnosticsThrottle>,
    /// Bumped by every `register_candidate`.
    generation: AtomicU64,
    counters: Counters,
}

impl BindingResolver {
    /// Creates a resolver over `catalog`.
    #[must_use]
    pub fn new(
        detector: Arc<CapabilityDetector>,
        runtime: Arc<dyn ForeignRuntime>,
        catalog: CandidateCatalog,
        throttle: Arc<DiagnosticsThrottle>,
    ) -> Self {
        Self {
            detector,
            runtime,
            catalog: RwLock::new(catalog),
            cache: DashMap::new(),
            throttle,
            generation: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// The detector this resolver consults.
    #[must_use]
    pub fn detector(&self) -> &Arc<CapabilityDetector> {
        &self.detector
    }

    /// Returns the binding for `key`, resolving it on first use.
    ///
    /// # Errors
    ///
    /// - [`BindError::ModuleAbsent`] if the owning module is not loaded.
    /// - [`BindError::NoCandidateMatched`] if every candidate failed.
    pub fn resolve(&self, key: &CapabilityKey) -> BindResult<Arc<ResolvedBinding>> {
        if let Some(binding) = self.cache.get(key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(binding.value()));
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        if !self.detector.is_present(key.module) {
            self.counters.absent.fetch_add(1, Ordering::Relaxed);
            return Err(BindError::ModuleAbsent(key.module));
        }

        // Copy the list out so the catalog lock is not held across foreign calls.
        let candidates: Vec<Candidate> = self.catalog.read().candidates(key).to_vec();
        let mut last_reason = None;

        for candidate in &candidates {
            let outcome = catch_unwind(AssertUnwindSafe(|| candidate.attempt(&self.runtime)));
            match outcome {
                Ok(Ok(resolution)) => {
                    let binding = Arc::new(ResolvedBinding::new(
                        key.clone(),
                        resolution.class_name,
                        candidate.label(),
                        resolution.method,
                    ));
                    let stored =
                        Arc::clone(self.cache.entry(key.clone()).or_insert(binding).value());
                    self.counters.resolved.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        capability = %key,
                        class = stored.discovered_on_class(),
                        candidate = stored.candidate(),
                        "capability bound"
                    );
                    return Ok(stored);
                }
                Ok(Err(fault)) => {
                    debug!(capability = %key, candidate = candidate.label(), %fault, "candidate rejected");
                    last_reason = Some(fault.to_string());
                }
                Err(payload) => {
                    let reason = format!("panicked: {}", panic_message(&*payload));
                    debug!(capability = %key, candidate = candidate.label(), %reason, "candidate rejected");
                    last_reason = Some(reason);
                }
            }
        }

        // The caller owns the throttled warning for this failure.
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        debug!(
            capability = %key,
            attempts = candidates.len(),
            last_reason = last_reason.as_deref().unwrap_or("no candidates registered"),
            "no known API shape matched"
        );
        Err(BindError::NoCandidateMatched {
            key: key.clone(),
            attempts: candidates.len(),
            last_reason,
        })
    }

    /// Resolves the first capability in `keys` that binds, in order.
    ///
    /// # Errors
    ///
    /// Returns the last error if none binds. `ModuleAbsent` short-circuits.
    pub fn resolve_first(&self, keys: &[CapabilityKey]) -> BindResult<Arc<ResolvedBinding>> {
        let mut last = None;
        for key in keys {
            match self.resolve(key) {
                Ok(binding) => return Ok(binding),
                Err(err @ BindError::ModuleAbsent(_)) => return Err(err),
                Err(err) => last = Some(err),
            }
        }
        Err(last.unwrap_or_else(|| {
            BindError::HostQueryFailed("no capabilities requested".to_owned())
        }))
    }

    /// Resolves `key` and calls it, with call failures logged (throttled).
    ///
    /// # Errors
    ///
    /// Any resolution error, or [`BindError::InvocationFailed`].
    pub fn invoke(&self, key: &CapabilityKey, args: &[ForeignValue]) -> BindResult<ForeignValue> {
        let binding = self.resolve(key)?;
        binding.invoke(args).map_err(|err| self.note_invocation_failure(err))
    }

    /// Resolves `key`, calls it and expects geometry back.
    ///
    /// # Errors
    ///
    /// As [`invoke`](Self::invoke).
    pub fn invoke_boxes(
        &self,
        key: &CapabilityKey,
        args: &[ForeignValue],
    ) -> BindResult<Vec<RenderBox>> {
        let binding = self.resolve(key)?;
        binding
            .invoke_boxes(args)
            .map_err(|err| self.note_invocation_failure(err))
    }

    /// Appends a candidate for `key`. A key that failed before may succeed
    /// on the next `resolve`, since failures are not cached.
    pub fn register_candidate(&self, key: CapabilityKey, candidate: Candidate) {
        self.catalog.write().push(key, candidate);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Catalog generation: starts at 0 and grows with each registered
    /// candidate. Callers holding failed work retry when it changes.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// The cached binding for `key`, without resolving.
    #[must_use]
    pub fn cached(&self, key: &CapabilityKey) -> Option<Arc<ResolvedBinding>> {
        self.cache.get(key).map(|b| Arc::clone(b.value()))
    }

    /// Every cached binding, sorted by key.
    #[must_use]
    pub fn cached_bindings(&self) -> Vec<Arc<ResolvedBinding>> {
        let mut all: Vec<_> = self.cache.iter().map(|e| Arc::clone(e.value())).collect();
        all.sort_by(|a, b| a.key().cmp(b.key()));
        all
    }

    /// Number of cached bindings.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> ResolverStats {
        let c = &self.counters;
        ResolverStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            resolved: c.resolved.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            absent: c.absent.load(Ordering::Relaxed),
        }
    }

    fn note_invocation_failure(&self, err: BindError) -> BindError {
        if let Some(suppressed) = self.throttle.admit(category::INVOKE) {
            warn!(error = %err, suppressed, "foreign call failed");
        }
        err
    }
}

impl fmt::Debug for BindingResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingResolver")
            .field("cached", &self.cache.len())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
