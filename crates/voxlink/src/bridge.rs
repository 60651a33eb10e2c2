//! # Capability Bridge
//!
//! The one object the host constructs at startup. It owns every cache and
//! hands the render stage, tick scan, teardown and collision callbacks to
//! the right component.
//!
//! ```text
//!                      ┌────────────────────────────────────────┐
//!   host render ─────► │ CapabilityBridge                       │
//!   host tick   ─────► │   PipelineHook ──► RenderArtifactCache │
//!   teardown    ─────► │        │                               │
//!   collision   ─────► │   CollisionRouter                      │
//!                      │        │                               │
//!                      │   BindingResolver ──► CapabilityDetector
//!                      │        │                               │
//!                      │   DiagnosticsThrottle (shared)         │
//!                      └────────┼───────────────────────────────┘
//!                               ▼
//!                         ForeignRuntime (host-provided)
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;
use voxlink_binding::{
    default_strategies, BindingResolver, Candidate, CandidateCatalog, CapabilityDetector,
    DependencyHandle, DetectionStrategy, ForeignRuntime, ResolverStats,
};
use voxlink_core::{
    BridgeConfig, CapabilityKey, Clock, ConfigResult, DiagnosticsThrottle, ModuleId,
    MonotonicClock, RenderBox, StructureId, ThrottleSnapshot,
};
use voxlink_rendering::{
    BridgeEvent, BridgeEventBus, BridgeStats, BufferSubmission, CacheStats, CellContent,
    CollisionRouter, CollisionStats, EventReceiver, FrameParams, FrameStats, PipelineHook,
    RenderArtifactCache, ScanStats, StructureSource, TransformStack, DEFAULT_EVENT_CAPACITY,
};

/// Builder for [`CapabilityBridge`].
pub struct BridgeBuilder {
    config: BridgeConfig,
    clock: Option<Arc<dyn Clock>>,
    catalog: Option<CandidateCatalog>,
    strategies: Option<Vec<Box<dyn DetectionStrategy>>>,
    event_capacity: usize,
}

impl BridgeBuilder {
    /// Starts from `config`.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            clock: None,
            catalog: None,
            strategies: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Clock for the diagnostics throttle (tests use a manual clock).
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replaces the built-in candidate catalog.
    #[must_use]
    pub fn catalog(mut self, catalog: CandidateCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Replaces the built-in detection strategies.
    #[must_use]
    pub fn strategies(mut self, strategies: Vec<Box<dyn DetectionStrategy>>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    /// Sets the event channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Validates the config and wires the components together.
    ///
    /// Detection does not run here; it runs on first use.
    ///
    /// # Errors
    ///
    /// [`voxlink_core::ConfigError::Invalid`] if the config fails validation.
    pub fn build(self, runtime: Arc<dyn ForeignRuntime>) -> ConfigResult<CapabilityBridge> {
        self.config.validate()?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()) as Arc<dyn Clock>);
        let throttle = Arc::new(DiagnosticsThrottle::from_config(&self.config.throttle, clock));
        let detector = Arc::new(CapabilityDetector::with_strategies(
            Arc::clone(&runtime),
            &self.config,
            Arc::clone(&throttle),
            self.strategies.unwrap_or_else(default_strategies),
        ));
        let resolver = Arc::new(BindingResolver::new(
            Arc::clone(&detector),
            runtime,
            self.catalog.unwrap_or_else(CandidateCatalog::builtin),
            Arc::clone(&throttle),
        ));
        let cache = Arc::new(RenderArtifactCache::new());
        let events = BridgeEventBus::new(self.event_capacity);
        let hook = PipelineHook::new(
            Arc::clone(&resolver),
            Arc::clone(&cache),
            Arc::clone(&throttle),
            self.config.render.clone(),
        )
        .with_events(events.sender());
        let collision = CollisionRouter::new(Arc::clone(&resolver), Arc::clone(&throttle));

        info!(stage = %self.config.render.stage, "capability bridge constructed");
        Ok(CapabilityBridge {
            config: self.config,
            throttle,
            detector,
            resolver,
            cache,
            hook,
            collision,
            events,
        })
    }
}

impl fmt::Debug for BridgeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeBuilder")
            .field("config", &self.config)
            .field("event_capacity", &self.event_capacity)
            .finish_non_exhaustive()
    }
}

/// Process-scoped bridge state.
pub struct CapabilityBridge {
    config: BridgeConfig,
    throttle: Arc<DiagnosticsThrottle>,
    detector: Arc<CapabilityDetector>,
    resolver: Arc<BindingResolver>,
    cache: Arc<RenderArtifactCache>,
    hook: PipelineHook,
    collision: CollisionRouter,
    events: BridgeEventBus,
}

impl CapabilityBridge {
    /// Builds a bridge with the built-in catalog and strategies.
    ///
    /// # Errors
    ///
    /// See [`BridgeBuilder::build`].
    pub fn new(config: BridgeConfig, runtime: Arc<dyn ForeignRuntime>) -> ConfigResult<Self> {
        BridgeBuilder::new(config).build(runtime)
    }

    /// Starts a builder.
    #[must_use]
    pub fn builder(config: BridgeConfig) -> BridgeBuilder {
        BridgeBuilder::new(config)
    }

    /// True when both modules are loaded. Triggers detection on first call.
    pub fn is_bridge_active(&self) -> bool {
        self.detector.both_present()
    }

    /// Detection result for one module.
    pub fn dependency(&self, module: ModuleId) -> Arc<DependencyHandle> {
        self.detector.detect(module)
    }

    /// Render-stage callback. See [`PipelineHook::on_render_stage`].
    pub fn on_render_stage(
        &self,
        stage: &str,
        source: &dyn StructureSource,
        poses: &mut dyn TransformStack,
        buffers: &mut dyn BufferSubmission,
        params: FrameParams,
    ) -> FrameStats {
        self.hook.on_render_stage(stage, source, poses, buffers, params)
    }

    /// Tick-context scan. See [`PipelineHook::scan_tick`].
    pub fn scan_tick(&self, source: &dyn StructureSource) -> ScanStats {
        self.hook.scan_tick(source)
    }

    /// Host teardown notification for a disassembled structure.
    pub fn on_structure_teardown(&self, structure: StructureId) -> usize {
        self.hook.on_structure_teardown(structure)
    }

    /// Manual cache bust for debug tooling. Cells are recomputed on the
    /// next frame, including ones whose computation failed.
    pub fn force_invalidate(&self, structure: StructureId) -> usize {
        let cells = self.cache.invalidate_structure(structure);
        info!(%structure, cells, "cache entries force-invalidated");
        self.events
            .sender()
            .send(BridgeEvent::StructureInvalidated { structure, cells });
        cells
    }

    /// Drops the cache for every structure.
    pub fn force_invalidate_all(&self) -> usize {
        let structures = self.cache.clear();
        info!(structures, "artifact cache cleared");
        structures
    }

    /// Collision boxes for a cell. See [`CollisionRouter::collision_boxes`].
    pub fn collision_boxes(&self, structure: StructureId, cell: &CellContent) -> Vec<RenderBox> {
        self.collision.collision_boxes(structure, cell)
    }

    /// Appends a candidate API shape at runtime. Cells that failed under
    /// the old catalog are retried on their next visit.
    pub fn register_candidate(&self, key: CapabilityKey, candidate: Candidate) {
        self.resolver.register_candidate(key, candidate);
    }

    /// A consumer handle on the bridge event feed.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        self.events.receiver()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Shared diagnostics throttle.
    #[must_use]
    pub fn throttle(&self) -> &Arc<DiagnosticsThrottle> {
        &self.throttle
    }

    /// Capability detector.
    #[must_use]
    pub fn detector(&self) -> &Arc<CapabilityDetector> {
        &self.detector
    }

    /// Binding resolver.
    #[must_use]
    pub fn resolver(&self) -> &Arc<BindingResolver> {
        &self.resolver
    }

    /// Artifact cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<RenderArtifactCache> {
        &self.cache
    }

    /// Pipeline hook.
    #[must_use]
    pub fn hook(&self) -> &PipelineHook {
        &self.hook
    }

    /// Point-in-time status of every component.
    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            active: self.is_bridge_active(),
            dependencies: ModuleId::ALL.map(|m| self.detector.detect(m)).to_vec(),
            bindings: self
                .resolver
                .cached_bindings()
                .iter()
                .map(|b| BindingStatus {
                    key: b.key().clone(),
                    class: b.discovered_on_class().to_owned(),
                    candidate: b.candidate().to_owned(),
                    invocations: b.invocations(),
                })
                .collect(),
            resolver: self.resolver.stats(),
            cache: self.cache.stats(),
            frames: self.hook.totals(),
            last_frame: self.hook.last_frame(),
            collision: self.collision.stats(),
            throttle: self.throttle.snapshot(),
            events_dropped: self.events.dropped(),
        }
    }

    /// Human-readable status, for diagnostic commands.
    pub fn status_summary(&self) -> String {
        self.status().to_string()
    }
}

impl fmt::Debug for CapabilityBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityBridge")
            .field("detector", &self.detector)
            .field("resolver", &self.resolver)
            .field("hook", &self.hook)
            .finish_non_exhaustive()
    }
}

/// One cached binding, as shown in the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingStatus {
    /// Capability.
    pub key: CapabilityKey,
    /// Class the binding was found on.
    pub class: String,
    /// Candidate that matched.
    pub candidate: String,
    /// Calls made through the binding.
    pub invocations: u64,
}

/// Snapshot returned by [`CapabilityBridge::status`].
#[derive(Debug, Clone)]
pub struct BridgeStatus {
    /// Both modules loaded.
    pub active: bool,
    /// Detection result per module.
    pub dependencies: Vec<Arc<DependencyHandle>>,
    /// Cached bindings, sorted by key.
    pub bindings: Vec<BindingStatus>,
    /// Resolver counters.
    pub resolver: ResolverStats,
    /// Cache occupancy.
    pub cache: CacheStats,
    /// Lifetime frame totals.
    pub frames: BridgeStats,
    /// Most recent frame.
    pub last_frame: FrameStats,
    /// Collision routing counters.
    pub collision: CollisionStats,
    /// Throttle state per category.
    pub throttle: BTreeMap<String, ThrottleSnapshot>,
    /// Events dropped on a full channel.
    pub events_dropped: u64,
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "voxlink bridge: {}",
            if self.active { "active" } else { "inactive" }
        )?;

        for dep in &self.dependencies {
            match dep.strategy {
                Some(strategy) if dep.present => {
                    write!(f, "  {}: present via {strategy}", dep.module)?;
                    if !dep.version_hints.is_empty() {
                        write!(f, " {:?}", dep.version_hints)?;
                    }
                    writeln!(f)?;
                }
                _ => writeln!(f, "  {}: absent", dep.module)?,
            }
        }

        writeln!(f, "  bindings: {} cached", self.bindings.len())?;
        for b in &self.bindings {
            writeln!(
                f,
                "    {} -> {} via {} ({} calls)",
                b.key, b.class, b.candidate, b.invocations
            )?;
        }

        let r = &self.resolver;
        writeln!(
            f,
            "  resolver: hits={} misses={} resolved={} failed={} absent={}",
            r.hits, r.misses, r.resolved, r.failed, r.absent
        )?;

        let c = &self.cache;
        writeln!(
            f,
            "  cache: structures={} artifacts={} boxes={} placeholders={} (failed={}) invalidations={}",
            c.structures, c.artifacts, c.boxes, c.placeholders, c.failed, c.invalidations
        )?;

        let t = &self.frames;
        writeln!(
            f,
            "  frames: ran={} skipped={} abandoned={} scans={} teardowns={}",
            t.frames, t.frames_skipped, t.frames_abandoned, t.scans, t.teardowns
        )?;
        writeln!(
            f,
            "  work: computed={} failed={} submitted={} submit_failures={} last_frame={}us",
            t.artifacts_computed,
            t.computations_failed,
            t.submissions,
            t.submit_failures,
            t.last_frame_time_us
        )?;

        let col = &self.collision;
        writeln!(
            f,
            "  collision: routed={} skipped={} failed={}",
            col.routed, col.skipped, col.failed
        )?;

        write!(
            f,
            "  diagnostics: emitted={} events_dropped={}",
            t.diagnostics_emitted, self.events_dropped
        )?;
        for (category, snap) in &self.throttle {
            write!(
                f,
                "\n    {category}: emitted={} suppressed={} every {}ms",
                snap.emitted, snap.suppressed, snap.min_interval_ms
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxlink_binding::{MockClass, MockRuntime};
    use voxlink_core::{ArgShape, ConfigError, ForeignValue, ModuleDescriptor};

    fn runtime() -> Arc<dyn ForeignRuntime> {
        Arc::new(
            MockRuntime::new()
                .with_module("kinetics")
                .with_module("microvoxel")
                .with_class(
                    MockClass::new("team.microvoxel.client.render.TileCollectionRenderer")
                        .with_method("renderBoxes", ArgShape::handle(), |_| {
                            Ok(ForeignValue::Boxes(vec![RenderBox::unit()]))
                        }),
                ),
        )
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = BridgeConfig::default();
        config.micro_voxel = ModuleDescriptor::default();
        let err = CapabilityBridge::new(config, runtime()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_status_summary_lists_dependencies_and_bindings() {
        let bridge = CapabilityBridge::new(BridgeConfig::default(), runtime()).unwrap();
        assert!(bridge.is_bridge_active());
        bridge
            .resolver()
            .resolve(&CapabilityKey::render_tile_collection())
            .unwrap();

        let summary = bridge.status_summary();
        assert!(summary.starts_with("voxlink bridge: active"));
        assert!(summary.contains("assembly: present via registry-query"));
        assert!(summary.contains("micro-voxel: present via registry-query"));
        assert!(summary.contains("bindings: 1 cached"));
        assert!(summary.contains("TileCollectionRenderer"));
    }

    #[test]
    fn test_inactive_summary() {
        let runtime: Arc<dyn ForeignRuntime> = Arc::new(MockRuntime::new().with_module("kinetics"));
        let bridge = CapabilityBridge::new(BridgeConfig::default(), runtime).unwrap();
        let summary = bridge.status_summary();
        assert!(summary.starts_with("voxlink bridge: inactive"));
        assert!(summary.contains("micro-voxel: absent"));
    }

    #[test]
    fn test_force_invalidate_publishes_event() {
        let bridge = CapabilityBridge::new(BridgeConfig::default(), runtime()).unwrap();
        let events = bridge.subscribe();
        bridge.cache().ensure_placeholder(StructureId(5), Default::default());
        assert_eq!(bridge.force_invalidate(StructureId(5)), 1);
        assert_eq!(
            events.drain(),
            vec![BridgeEvent::StructureInvalidated {
                structure: StructureId(5),
                cells: 1,
            }]
        );
        assert_eq!(bridge.force_invalidate(StructureId(5)), 0);
    }
}
