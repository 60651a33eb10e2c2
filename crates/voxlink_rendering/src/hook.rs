//! # Pipeline Hook
//!
//! Runs at one host render stage every frame and draws the micro-voxel
//! cells sitting inside assembly structures.
//!
//! ## Per-frame flow
//!
//! ```text
//! on_render_stage(stage, ...)
//!    │
//!    ├── wrong stage / module absent ───────────────► skipped
//!    ├── enumerate structures ── host fault ────────► frame abandoned
//!    │
//!    └── for each cell
//!          ├── not micro-voxel ─────────────────────► ignored
//!          ├── Artifact ────────────────────────────► push · translate · submit · pop
//!          ├── Absent ── placeholder ── claim ──┐
//!          └── Placeholder ───────── claim ──┤   (failed: only after the
//!                                               │    candidate catalog grew)
//!                                               ▼
//!                     resolve_first(render capabilities) ── invoke
//!                          ├── ok ───► cache ──► submit
//!                          └── err ──► mark failed, throttled warn
//! ```
//!
//! Nothing raised by a foreign call or a host callback escapes a cell:
//! every such call sits behind `catch_unwind` or a `BindResult`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use voxlink_binding::{panic_message, BindingResolver};
use voxlink_core::{
    category, BindError, BindResult, CapabilityKey, DiagnosticsThrottle, ForeignHandle,
    ForeignValue, RenderConfig, StructureId,
};

use crate::artifact::{CacheSlot, RenderArtifact};
use crate::cache::RenderArtifactCache;
use crate::events::{BridgeEvent, EventSender};
use crate::host::{
    BufferSubmission, CellContent, FrameParams, StructureContext, StructureSource, TransformStack,
};
use crate::stats::{BridgeStats, FrameStats, ScanStats, SkipReason};

/// Result of visiting one foreign cell.
enum Outcome {
    Hit(Arc<RenderArtifact>),
    Computed(Arc<RenderArtifact>),
    Pending,
    Failed,
}

struct Visit {
    placeholder_created: bool,
    outcome: Outcome,
}

/// Render-stage and tick-scan entry points.
pub struct PipelineHook {
    resolver: Arc<BindingResolver>,
    cache: Arc<RenderArtifactCache>,
    throttle: Arc<DiagnosticsThrottle>,
    config: RenderConfig,
    /// Tried in order when computing an artifact.
    render_capabilities: [CapabilityKey; 2],
    events: Option<EventSender>,
    totals: Mutex<BridgeStats>,
    last_frame: Mutex<FrameStats>,
}

impl PipelineHook {
    /// Creates a hook drawing at `config.stage`.
    #[must_use]
    pub fn new(
        resolver: Arc<BindingResolver>,
        cache: Arc<RenderArtifactCache>,
        throttle: Arc<DiagnosticsThrottle>,
        config: RenderConfig,
    ) -> Self {
        Self {
            resolver,
            cache,
            throttle,
            config,
            render_capabilities: [
                CapabilityKey::render_tile_collection(),
                CapabilityKey::block_entity_renderer(),
            ],
            events: None,
            totals: Mutex::new(BridgeStats::default()),
            last_frame: Mutex::new(FrameStats::default()),
        }
    }

    /// Publishes bridge events to `sender`.
    #[must_use]
    pub fn with_events(mut self, sender: EventSender) -> Self {
        self.events = Some(sender);
        self
    }

    /// The render stage this hook is bound to.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.config.stage
    }

    /// Hook settings.
    #[must_use]
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// The artifact cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<RenderArtifactCache> {
        &self.cache
    }

    /// The binding resolver.
    #[must_use]
    pub fn resolver(&self) -> &Arc<BindingResolver> {
        &self.resolver
    }

    /// True when both modules are loaded.
    pub fn is_active(&self) -> bool {
        self.resolver.detector().both_present()
    }

    /// Stats of the last render-stage call.
    #[must_use]
    pub fn last_frame(&self) -> FrameStats {
        *self.last_frame.lock()
    }

    /// Lifetime totals.
    #[must_use]
    pub fn totals(&self) -> BridgeStats {
        *self.totals.lock()
    }

    /// Render-stage callback.
    ///
    /// Returns the stats of this pass. Never fails: every fault is either
    /// confined to its cell or abandons the whole frame.
    pub fn on_render_stage(
        &self,
        stage: &str,
        source: &dyn StructureSource,
        poses: &mut dyn TransformStack,
        buffers: &mut dyn BufferSubmission,
        params: FrameParams,
    ) -> FrameStats {
        if stage != self.config.stage {
            return self.finish_frame(FrameStats::skipped(SkipReason::OtherStage));
        }
        if !self.is_active() {
            return self.finish_frame(FrameStats::skipped(SkipReason::Inactive));
        }

        let start = Instant::now();
        let structures = match self.enumerate(source) {
            Ok(structures) => structures,
            Err(err) => {
                if let Some(suppressed) = self.admit(category::HOST_QUERY) {
                    warn!(%err, suppressed, "structure enumeration failed, frame abandoned");
                }
                self.publish(BridgeEvent::FrameAbandoned);
                return self.finish_frame(FrameStats::skipped(SkipReason::HostQueryFailed));
            }
        };

        let mut stats = FrameStats::default();
        let limit = self.config.max_cells_per_frame;

        'structures: for structure in &structures {
            stats.structures += 1;
            for cell in &structure.cells {
                stats.cells_visited += 1;
                if !self.is_micro_voxel(&cell.block) {
                    continue;
                }
                if limit != 0 && stats.foreign_cells as usize >= limit {
                    stats.truncated = true;
                    break 'structures;
                }
                stats.foreign_cells += 1;

                let visit = self.visit_cell(structure.id, cell, true);
                if visit.placeholder_created {
                    stats.placeholders_created += 1;
                }
                let artifact = match visit.outcome {
                    Outcome::Hit(artifact) => {
                        stats.cache_hits += 1;
                        artifact
                    }
                    Outcome::Computed(artifact) => {
                        stats.computed += 1;
                        artifact
                    }
                    Outcome::Pending => {
                        stats.pending += 1;
                        continue;
                    }
                    Outcome::Failed => {
                        stats.failed += 1;
                        continue;
                    }
                };
                if artifact.is_empty() {
                    continue;
                }

                match submit(poses, buffers, cell, &artifact, params) {
                    Ok(()) => stats.submitted += 1,
                    Err(reason) => {
                        stats.submit_failures += 1;
                        if let Some(suppressed) = self.admit(category::RENDER_CELL) {
                            warn!(
                                structure = %structure.id,
                                cell = %cell.coord,
                                %reason,
                                suppressed,
                                "artifact submission failed"
                            );
                        }
                    }
                }
            }
        }

        stats.frame_time_us = u32::try_from(start.elapsed().as_micros()).unwrap_or(u32::MAX);
        trace!(?stats, "render stage done");
        self.finish_frame(stats)
    }

    /// Drops every cached entry of a structure that left the world.
    /// Returns the number of cells removed.
    pub fn on_structure_teardown(&self, structure: StructureId) -> usize {
        let cells = self.cache.invalidate_structure(structure);
        self.totals.lock().teardowns += 1;
        debug!(%structure, cells, "structure torn down, cache entries dropped");
        self.publish(BridgeEvent::StructureInvalidated { structure, cells });
        cells
    }

    /// Tick-context pass: records placeholders for newly seen foreign cells
    /// so the render thread finds them, and with `compute_on_scan` computes
    /// them here instead.
    pub fn scan_tick(&self, source: &dyn StructureSource) -> ScanStats {
        let mut stats = ScanStats::default();
        if !self.is_active() {
            return stats;
        }

        let structures = match self.enumerate(source) {
            Ok(structures) => structures,
            Err(err) => {
                if let Some(suppressed) = self.admit(category::SCAN) {
                    warn!(%err, suppressed, "structure enumeration failed during scan");
                }
                stats.abandoned = true;
                self.totals.lock().record_scan(&stats);
                return stats;
            }
        };

        let compute = self.config.compute_on_scan;
        for structure in &structures {
            stats.structures += 1;
            for cell in &structure.cells {
                if !self.is_micro_voxel(&cell.block) {
                    continue;
                }
                stats.foreign_cells += 1;
                let visit = self.visit_cell(structure.id, cell, compute);
                if visit.placeholder_created {
                    stats.placeholders_created += 1;
                }
                match visit.outcome {
                    Outcome::Computed(_) => stats.computed += 1,
                    Outcome::Failed => stats.failed += 1,
                    Outcome::Hit(_) | Outcome::Pending => {}
                }
            }
        }

        self.totals.lock().record_scan(&stats);
        debug!(?stats, "tick scan done");
        stats
    }

    fn is_micro_voxel(&self, block: &ForeignHandle) -> bool {
        self.resolver
            .detector()
            .classify(&block.class_name)
            .is_micro_voxel()
    }

    /// Cache lookup, placeholder, and (if `compute`) the claimed computation.
    fn visit_cell(&self, structure: StructureId, cell: &CellContent, compute: bool) -> Visit {
        let placeholder_created = match self.cache.get(structure, cell.coord) {
            CacheSlot::Artifact(artifact) => {
                return Visit {
                    placeholder_created: false,
                    outcome: Outcome::Hit(artifact),
                }
            }
            CacheSlot::Absent => self.cache.ensure_placeholder(structure, cell.coord),
            CacheSlot::Placeholder => false,
        };
        let pending = Visit {
            placeholder_created,
            outcome: Outcome::Pending,
        };

        // Read before computing, so a candidate registered mid-call
        // still earns the cell a retry.
        let generation = self.resolver.generation();
        if !compute || !self.cache.try_claim(structure, cell.coord, generation) {
            return pending;
        }

        let outcome = match self.compute(&cell.block) {
            Ok(artifact) => {
                let boxes = artifact.len();
                match self.cache.complete(structure, cell.coord, artifact) {
                    Some(artifact) => {
                        self.publish(BridgeEvent::ArtifactComputed {
                            structure,
                            cell: cell.coord,
                            boxes,
                        });
                        Outcome::Computed(artifact)
                    }
                    // Torn down while computing.
                    None => Outcome::Pending,
                }
            }
            Err(err) => {
                self.cache.mark_failed(structure, cell.coord);
                if let Some(suppressed) = self.admit(category::RENDER_CELL) {
                    warn!(
                        %structure,
                        cell = %cell.coord,
                        class = %cell.block.class_name,
                        %err,
                        suppressed,
                        "micro-voxel cell left unrendered"
                    );
                }
                self.publish(BridgeEvent::CellFailed {
                    structure,
                    cell: cell.coord,
                    reason: err.label(),
                });
                Outcome::Failed
            }
        };
        Visit {
            placeholder_created,
            outcome,
        }
    }

    fn compute(&self, block: &ForeignHandle) -> BindResult<RenderArtifact> {
        let binding = self.resolver.resolve_first(&self.render_capabilities)?;
        let boxes = binding.invoke_boxes(&[ForeignValue::Handle(block.clone())])?;
        Ok(RenderArtifact::new(boxes, binding.key().clone()))
    }

    fn enumerate(&self, source: &dyn StructureSource) -> BindResult<Vec<StructureContext>> {
        match catch_unwind(AssertUnwindSafe(|| source.enumerate_active_structures())) {
            Ok(Ok(structures)) => Ok(structures),
            Ok(Err(err)) => Err(BindError::HostQueryFailed(err.to_string())),
            Err(payload) => Err(BindError::HostQueryFailed(panic_message(&*payload))),
        }
    }

    /// Throttle gate that also counts accepted diagnostics.
    fn admit(&self, category: &str) -> Option<u64> {
        let admitted = self.throttle.admit(category);
        if admitted.is_some() {
            self.totals.lock().diagnostics_emitted += 1;
        }
        admitted
    }

    fn publish(&self, event: BridgeEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }

    fn finish_frame(&self, stats: FrameStats) -> FrameStats {
        self.totals.lock().record_frame(&stats);
        *self.last_frame.lock() = stats;
        stats
    }
}

impl std::fmt::Debug for PipelineHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHook")
            .field("stage", &self.config.stage)
            .field("totals", &self.totals())
            .finish_non_exhaustive()
    }
}

/// Draws one artifact at its cell offset. The pose is always popped.
fn submit(
    poses: &mut dyn TransformStack,
    buffers: &mut dyn BufferSubmission,
    cell: &CellContent,
    artifact: &RenderArtifact,
    params: FrameParams,
) -> Result<(), String> {
    poses.push_pose();
    poses.translate(cell.coord.offset());
    let light = cell.light.unwrap_or(params.light);
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        buffers.submit(artifact, light, params.overlay)
    }));
    poses.pop_pose();
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(panic_message(&*payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BridgeEventBus;
    use crate::mock::{MockStructureSource, RecordingBuffers};
    use std::sync::atomic::{AtomicBool, Ordering};
    use voxlink_binding::{Candidate, CandidateCatalog, CapabilityDetector, MockClass, MockRuntime};
    use voxlink_core::{ArgShape, BridgeConfig, CellCoord, ManualClock, RenderBox};

    const TILES: &str = "team.microvoxel.common.block.BETiles";
    const RENDERER: &str = "team.microvoxel.client.render.TileCollectionRenderer";
    const STONE: &str = "org.kinetics.content.CasingBlock";
    const STAGE: &str = voxlink_core::config::DEFAULT_RENDER_STAGE;

    struct Fixture {
        runtime: Arc<MockRuntime>,
        throttle: Arc<DiagnosticsThrottle>,
        clock: Arc<ManualClock>,
        hook: PipelineHook,
    }

    fn runtime_with_renderer(boxes: usize) -> MockRuntime {
        MockRuntime::new()
            .with_module("kinetics")
            .with_module("microvoxel")
            .with_class(MockClass::new(TILES))
            .with_class(MockClass::new(RENDERER).with_method(
                "renderBoxes",
                ArgShape::handle(),
                move |_| Ok(ForeignValue::Boxes(vec![RenderBox::unit(); boxes])),
            ))
    }

    fn fixture_with(runtime: MockRuntime, render: RenderConfig) -> Fixture {
        let runtime = Arc::new(runtime);
        let clock = Arc::new(ManualClock::new(0));
        let throttle = Arc::new(DiagnosticsThrottle::with_clock(3000, clock.clone()));
        let config = BridgeConfig::default();
        let dyn_runtime: Arc<dyn voxlink_binding::ForeignRuntime> = runtime.clone();
        let detector = Arc::new(CapabilityDetector::new(
            Arc::clone(&dyn_runtime),
            &config,
            Arc::clone(&throttle),
        ));
        let resolver = Arc::new(BindingResolver::new(
            detector,
            dyn_runtime,
            CandidateCatalog::builtin(),
            Arc::clone(&throttle),
        ));
        let hook = PipelineHook::new(
            resolver,
            Arc::new(RenderArtifactCache::new()),
            Arc::clone(&throttle),
            render,
        );
        Fixture {
            runtime,
            throttle,
            clock,
            hook,
        }
    }

    fn fixture(runtime: MockRuntime) -> Fixture {
        fixture_with(runtime, RenderConfig::default())
    }

    fn tiles(id: u64) -> ForeignHandle {
        ForeignHandle::new(TILES, id)
    }

    fn one_structure() -> MockStructureSource {
        MockStructureSource::new().with_structure(StructureContext::new(
            StructureId(7),
            vec![
                CellContent::new(CellCoord::new(0, 1, 0), tiles(1)),
                CellContent::new(CellCoord::new(0, 0, 0), ForeignHandle::new(STONE, 2)),
            ],
        ))
    }

    fn frame(fx: &Fixture, source: &MockStructureSource, buffers: &mut RecordingBuffers) -> FrameStats {
        let mut poses = crate::mock::RecordingPoses::default();
        let stats = fx.hook.on_render_stage(STAGE, source, &mut poses, buffers, FrameParams::default());
        assert_eq!(poses.depth(), 0);
        stats
    }

    #[test]
    fn test_first_frame_computes_then_hits() {
        let fx = fixture(runtime_with_renderer(3));
        let source = one_structure();
        let mut buffers = RecordingBuffers::default();

        let first = frame(&fx, &source, &mut buffers);
        assert_eq!(first.foreign_cells, 1);
        assert_eq!(first.placeholders_created, 1);
        assert_eq!(first.computed, 1);
        assert_eq!(first.submitted, 1);

        let second = frame(&fx, &source, &mut buffers);
        assert_eq!(second.cache_hits, 1);
        assert_eq!(second.computed, 0);
        assert_eq!(fx.runtime.invocations_under(RENDERER), 1);

        let submission = &buffers.submissions()[0];
        assert_eq!(submission.boxes, 3);
        assert_eq!(submission.light, FrameParams::default().light);

        let mut poses = crate::mock::RecordingPoses::default();
        fx.hook
            .on_render_stage(STAGE, &source, &mut poses, &mut buffers, FrameParams::default());
        assert_eq!(poses.translations(), &[[0.0, 1.0, 0.0]]);
        assert_eq!(poses.max_depth(), 1);
    }

    #[test]
    fn test_other_stage_is_skipped() {
        let fx = fixture(runtime_with_renderer(1));
        let mut poses = crate::mock::RecordingPoses::default();
        let mut buffers = RecordingBuffers::default();
        let stats = fx.hook.on_render_stage(
            "after-translucent",
            &one_structure(),
            &mut poses,
            &mut buffers,
            FrameParams::default(),
        );
        assert_eq!(stats.skipped, Some(SkipReason::OtherStage));
        assert_eq!(fx.hook.totals().frames_skipped, 1);
    }

    #[test]
    fn test_inactive_when_module_missing() {
        let fx = fixture(MockRuntime::new().with_module("kinetics"));
        let mut buffers = RecordingBuffers::default();
        let stats = frame(&fx, &one_structure(), &mut buffers);
        assert_eq!(stats.skipped, Some(SkipReason::Inactive));
        assert!(fx.hook.cache().stats().structures == 0);
    }

    #[test]
    fn test_failed_resolution_leaves_placeholder_and_warns_once() {
        let runtime = MockRuntime::new()
            .with_module("kinetics")
            .with_module("microvoxel")
            .with_class(MockClass::new(TILES));
        let fx = fixture(runtime);
        let source = MockStructureSource::new().with_structure(StructureContext::new(
            StructureId(1),
            (0..4)
                .map(|x| CellContent::new(CellCoord::new(x, 0, 0), tiles(x as u64)))
                .collect(),
        ));
        let mut buffers = RecordingBuffers::default();

        let stats = frame(&fx, &source, &mut buffers);
        assert_eq!(stats.failed, 4);
        assert_eq!(stats.submitted, 0);
        assert!(fx.hook.cache().get(StructureId(1), CellCoord::new(0, 0, 0)).is_placeholder());
        let emitted: u64 = fx.throttle.snapshot().values().map(|s| s.emitted).sum();
        assert_eq!(emitted, 1);
        assert_eq!(fx.throttle.snapshot()[category::RENDER_CELL].emitted, 1);
        assert_eq!(fx.hook.totals().diagnostics_emitted, 1);

        // Failed cells are not retried every frame.
        let again = frame(&fx, &source, &mut buffers);
        assert_eq!(again.failed, 0);
        assert_eq!(again.pending, 4);
    }

    #[test]
    fn test_registered_candidate_retries_failed_cells() {
        let runtime = MockRuntime::new()
            .with_module("kinetics")
            .with_module("microvoxel")
            .with_class(MockClass::new(TILES))
            .with_class(MockClass::new("team.microvoxel.next.Drawer").with_method(
                "draw",
                ArgShape::handle(),
                |_| Ok(ForeignValue::Boxes(vec![RenderBox::unit()])),
            ));
        let fx = fixture(runtime);
        let source = one_structure();
        let mut buffers = RecordingBuffers::default();

        assert_eq!(frame(&fx, &source, &mut buffers).failed, 1);
        assert_eq!(frame(&fx, &source, &mut buffers).pending, 1);

        fx.hook.resolver().register_candidate(
            CapabilityKey::render_tile_collection(),
            Candidate::method(&["team.microvoxel.next.Drawer"], "draw", ArgShape::handle()),
        );
        let retried = frame(&fx, &source, &mut buffers);
        assert_eq!(retried.computed, 1);
        assert_eq!(retried.submitted, 1);
        assert_eq!(buffers.submissions().len(), 1);
        assert_eq!(fx.hook.cache().stats().failed, 0);
    }

    #[test]
    fn test_retry_that_fails_again_waits_for_next_registration() {
        let runtime = MockRuntime::new()
            .with_module("kinetics")
            .with_module("microvoxel")
            .with_class(MockClass::new(TILES));
        let fx = fixture(runtime);
        let source = one_structure();
        let mut buffers = RecordingBuffers::default();
        frame(&fx, &source, &mut buffers);

        fx.hook.resolver().register_candidate(
            CapabilityKey::render_tile_collection(),
            Candidate::method(&["team.microvoxel.missing.Drawer"], "draw", ArgShape::handle()),
        );
        assert_eq!(frame(&fx, &source, &mut buffers).failed, 1);
        let idle = frame(&fx, &source, &mut buffers);
        assert_eq!(idle.failed, 0);
        assert_eq!(idle.pending, 1);
    }

    #[test]
    fn test_fallback_capability_is_used() {
        let runtime = MockRuntime::new()
            .with_module("kinetics")
            .with_module("microvoxel")
            .with_class(MockClass::new(TILES))
            .with_class(
                MockClass::new("team.microvoxel.client.render.RendererRegistry").with_method(
                    "rendererFor",
                    ArgShape::handle(),
                    |_| Ok(ForeignValue::Handle(ForeignHandle::new("team.microvoxel.R", 1))),
                ),
            )
            .with_class(MockClass::new("team.microvoxel.R").with_method(
                "collectBoxes",
                ArgShape::new(vec![voxlink_core::ValueKind::Handle; 2]),
                |_| Ok(ForeignValue::Boxes(vec![RenderBox::unit(); 2])),
            ));
        let fx = fixture(runtime);
        let mut buffers = RecordingBuffers::default();
        let stats = frame(&fx, &one_structure(), &mut buffers);
        assert_eq!(stats.computed, 1);
        let artifact = fx
            .hook
            .cache()
            .get(StructureId(7), CellCoord::new(0, 1, 0))
            .artifact()
            .cloned()
            .unwrap();
        assert_eq!(artifact.source(), &CapabilityKey::block_entity_renderer());
    }

    #[test]
    fn test_host_query_failure_abandons_frame() {
        let fx = fixture(runtime_with_renderer(1));
        let source = one_structure();
        source.set_failure(true);
        let mut buffers = RecordingBuffers::default();
        let stats = frame(&fx, &source, &mut buffers);
        assert_eq!(stats.skipped, Some(SkipReason::HostQueryFailed));
        assert_eq!(fx.hook.totals().frames_abandoned, 1);

        source.set_failure(false);
        assert!(frame(&fx, &source, &mut buffers).ran());
    }

    #[test]
    fn test_panicking_invocation_is_confined_to_cell() {
        let hit = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&hit);
        let runtime = MockRuntime::new()
            .with_module("kinetics")
            .with_module("microvoxel")
            .with_class(MockClass::new(TILES))
            .with_class(MockClass::new(RENDERER).with_method(
                "renderBoxes",
                ArgShape::handle(),
                move |args| {
                    let id = args[0].as_handle().map_or(0, |h| h.id);
                    if id == 1 {
                        flag.store(true, Ordering::Relaxed);
                        panic!("corrupt tile data");
                    }
                    Ok(ForeignValue::Boxes(vec![RenderBox::unit()]))
                },
            ));
        let fx = fixture(runtime);
        let source = MockStructureSource::new().with_structure(StructureContext::new(
            StructureId(1),
            vec![
                CellContent::new(CellCoord::new(0, 0, 0), tiles(1)),
                CellContent::new(CellCoord::new(1, 0, 0), tiles(2)),
            ],
        ));
        let mut buffers = RecordingBuffers::default();
        let stats = frame(&fx, &source, &mut buffers);
        assert!(hit.load(Ordering::Relaxed));
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.submitted, 1);
    }

    #[test]
    fn test_submit_failure_still_pops_pose() {
        let fx = fixture(runtime_with_renderer(1));
        let mut buffers = RecordingBuffers::default();
        buffers.fail_submissions(true);
        let stats = frame(&fx, &one_structure(), &mut buffers);
        assert_eq!(stats.submit_failures, 1);
        assert_eq!(stats.submitted, 0);
    }

    #[test]
    fn test_teardown_invalidates_and_recomputes() {
        let fx = fixture(runtime_with_renderer(1));
        let source = one_structure();
        let mut buffers = RecordingBuffers::default();
        frame(&fx, &source, &mut buffers);
        assert_eq!(fx.hook.on_structure_teardown(StructureId(7)), 1);
        assert!(fx.hook.cache().get(StructureId(7), CellCoord::new(0, 1, 0)).is_absent());

        let stats = frame(&fx, &source, &mut buffers);
        assert_eq!(stats.computed, 1);
        assert_eq!(fx.runtime.invocations_under(RENDERER), 2);
    }

    #[test]
    fn test_cell_budget_truncates() {
        let fx = fixture_with(
            runtime_with_renderer(1),
            RenderConfig {
                max_cells_per_frame: 2,
                ..RenderConfig::default()
            },
        );
        let source = MockStructureSource::new().with_structure(StructureContext::new(
            StructureId(1),
            (0..5)
                .map(|x| CellContent::new(CellCoord::new(x, 0, 0), tiles(x as u64)))
                .collect(),
        ));
        let mut buffers = RecordingBuffers::default();
        let stats = frame(&fx, &source, &mut buffers);
        assert!(stats.truncated);
        assert_eq!(stats.foreign_cells, 2);
    }

    #[test]
    fn test_scan_records_placeholders_for_render_thread() {
        let fx = fixture(runtime_with_renderer(2));
        let source = one_structure();
        let scan = fx.hook.scan_tick(&source);
        assert_eq!(scan.placeholders_created, 1);
        assert_eq!(scan.computed, 0);
        assert!(fx.hook.cache().get(StructureId(7), CellCoord::new(0, 1, 0)).is_placeholder());

        let mut buffers = RecordingBuffers::default();
        let stats = frame(&fx, &source, &mut buffers);
        assert_eq!(stats.placeholders_created, 0);
        assert_eq!(stats.computed, 1);
    }

    #[test]
    fn test_scan_can_compute() {
        let fx = fixture_with(
            runtime_with_renderer(2),
            RenderConfig {
                compute_on_scan: true,
                ..RenderConfig::default()
            },
        );
        let scan = fx.hook.scan_tick(&one_structure());
        assert_eq!(scan.computed, 1);
        assert_eq!(fx.hook.totals().artifacts_computed, 1);
    }

    #[test]
    fn test_events_are_published() {
        let bus = BridgeEventBus::new(16);
        let mut fx = fixture(runtime_with_renderer(1));
        fx.hook = fx.hook.with_events(bus.sender());
        let source = one_structure();
        let mut buffers = RecordingBuffers::default();
        frame(&fx, &source, &mut buffers);
        fx.hook.on_structure_teardown(StructureId(7));

        let events = bus.receiver().drain();
        assert!(matches!(events[0], BridgeEvent::ArtifactComputed { boxes: 1, .. }));
        assert!(matches!(
            events[1],
            BridgeEvent::StructureInvalidated { cells: 1, .. }
        ));
    }

    #[test]
    fn test_render_cell_throttle_reopens_after_interval() {
        let runtime = MockRuntime::new()
            .with_module("kinetics")
            .with_module("microvoxel")
            .with_class(MockClass::new(TILES));
        let fx = fixture(runtime);
        let mut buffers = RecordingBuffers::default();
        frame(&fx, &one_structure(), &mut buffers);
        fx.hook.on_structure_teardown(StructureId(7));
        fx.clock.advance(3000);
        frame(&fx, &one_structure(), &mut buffers);
        assert_eq!(fx.throttle.snapshot()[category::RENDER_CELL].emitted, 2);
    }
}
