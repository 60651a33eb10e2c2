//! # Diagnostics Throttle
//!
//! The render loop runs every frame and a broken foreign cell fails every
//! frame. Without a gate that is thousands of identical log lines a minute.
//!
//! ```text
//!   render thread ──┐
//!                   ├──► should_emit("render-cell") ──► bucket CAS ──► true / false
//!   tick thread  ───┘
//! ```
//!
//! Each category owns a [`ThrottleBucket`]. A bucket opens at most once per
//! `min_interval_ms`. The timestamp is claimed with a compare-and-swap so two
//! threads racing for the same window cannot both win, and a lost race never
//! leaves the bucket closed beyond its interval.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::clock::{Clock, MonotonicClock};
use crate::config::ThrottleConfig;

/// Throttle categories used across the bridge.
pub mod category {
    /// Capability detection outcomes.
    pub const DETECTION: &str = "detection";
    /// Binding resolution failures.
    pub const RESOLVE: &str = "resolve";
    /// Failures of a resolved binding at call time.
    pub const INVOKE: &str = "invoke";
    /// Host structure enumeration failures.
    pub const HOST_QUERY: &str = "host-query";
    /// A cell that could not be rendered.
    pub const RENDER_CELL: &str = "render-cell";
    /// A cell whose collision could not be routed.
    pub const COLLISION: &str = "collision";
    /// Tick-context scanning.
    pub const SCAN: &str = "scan";
}

/// Sentinel for "never emitted".
const NEVER: u64 = u64::MAX;

/// Rate-limit state for one diagnostic category.
#[derive(Debug)]
pub struct ThrottleBucket {
    /// Clock reading of the last accepted emission, or `NEVER`.
    last_emit_ms: AtomicU64,
    /// Minimum spacing between accepted emissions.
    min_interval_ms: u64,
    /// Rejected attempts since the last accepted one.
    suppressed: AtomicU64,
    /// Total accepted emissions.
    emitted: AtomicU64,
}

impl ThrottleBucket {
    /// Creates a bucket that has never emitted.
    #[must_use]
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            last_emit_ms: AtomicU64::new(NEVER),
            min_interval_ms,
            suppressed: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
        }
    }

    /// Minimum spacing between emissions.
    #[inline]
    #[must_use]
    pub fn min_interval_ms(&self) -> u64 {
        self.min_interval_ms
    }

    /// Attempts to open the bucket at `now`. On success returns the number
    /// of attempts suppressed since the previous emission and resets it.
    /// The count is approximate under contention; the emit decision is not.
    fn try_open(&self, now: u64) -> Option<u64> {
        let last = self.last_emit_ms.load(Ordering::Acquire);
        if last != NEVER && now.saturating_sub(last) < self.min_interval_ms {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        match self
            .last_emit_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.emitted.fetch_add(1, Ordering::Relaxed);
                Some(self.suppressed.swap(0, Ordering::AcqRel))
            }
            Err(_) => {
                // Another thread claimed this window.
                self.suppressed.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn snapshot(&self) -> ThrottleSnapshot {
        let last = self.last_emit_ms.load(Ordering::Acquire);
        ThrottleSnapshot {
            min_interval_ms: self.min_interval_ms,
            last_emit_ms: (last != NEVER).then_some(last),
            emitted: self.emitted.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a bucket, for status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleSnapshot {
    /// Configured interval.
    pub min_interval_ms: u64,
    /// Last accepted emission, if any.
    pub last_emit_ms: Option<u64>,
    /// Total accepted emissions.
    pub emitted: u64,
    /// Attempts suppressed since the last accepted emission.
    pub suppressed: u64,
}

/// Per-category rate limiter shared by every bridge component.
pub struct DiagnosticsThrottle {
    clock: Arc<dyn Clock>,
    default_interval_ms: u64,
    overrides: HashMap<String, u64>,
    buckets: RwLock<HashMap<String, Arc<ThrottleBucket>>>,
}

impl DiagnosticsThrottle {
    /// Creates a throttle with one interval for every category.
    #[must_use]
    pub fn new(default_interval_ms: u64) -> Self {
        Self::with_clock(default_interval_ms, Arc::new(MonotonicClock::new()))
    }

    /// Creates a throttle reading time from `clock`.
    #[must_use]
    pub fn with_clock(default_interval_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            default_interval_ms,
            overrides: HashMap::new(),
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a throttle from config, with per-category overrides.
    #[must_use]
    pub fn from_config(config: &ThrottleConfig, clock: Arc<dyn Clock>) -> Self {
        let mut throttle = Self::with_clock(config.default_interval_ms, clock);
        throttle.overrides = config
            .overrides
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        throttle
    }

    /// Sets a category-specific interval. Only affects buckets created later.
    #[must_use]
    pub fn with_override(mut self, category: impl Into<String>, interval_ms: u64) -> Self {
        self.overrides.insert(category.into(), interval_ms);
        self
    }

    /// Interval that applies to `category`.
    #[must_use]
    pub fn interval_for(&self, category: &str) -> u64 {
        self.overrides
            .get(category)
            .copied()
            .unwrap_or(self.default_interval_ms)
    }

    /// Returns true at most once per interval for `category`, recording the
    /// emission when it does.
    #[inline]
    pub fn should_emit(&self, category: &str) -> bool {
        self.admit(category).is_some()
    }

    /// Like [`should_emit`](Self::should_emit), but on success also returns
    /// how many attempts were suppressed since the previous emission.
    pub fn admit(&self, category: &str) -> Option<u64> {
        let bucket = self.bucket(category);
        bucket.try_open(self.clock.now_ms())
    }

    /// Snapshot of every bucket created so far, sorted by category.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, ThrottleSnapshot> {
        self.buckets
            .read()
            .iter()
            .map(|(k, b)| (k.clone(), b.snapshot()))
            .collect()
    }

    fn bucket(&self, category: &str) -> Arc<ThrottleBucket> {
        if let Some(bucket) = self.buckets.read().get(category) {
            return Arc::clone(bucket);
        }
        let interval = self.interval_for(category);
        let mut buckets = self.buckets.write();
        Arc::clone(
            buckets
                .entry(category.to_owned())
                .or_insert_with(|| Arc::new(ThrottleBucket::new(interval))),
        )
    }
}

impl std::fmt::Debug for DiagnosticsThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticsThrottle")
            .field("default_interval_ms", &self.default_interval_ms)
            .field("overrides", &self.overrides)
            .field("buckets", &self.buckets.read().len())
            .finish_non_exhaustive()
    }
}
