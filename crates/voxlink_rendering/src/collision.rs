//! Collision routing for micro-voxel cells inside structures.
//!
//! Called from the simulation thread when a structure moves. Shapes are not
//! cached: the foreign module may change them between ticks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;
use voxlink_binding::BindingResolver;
use voxlink_core::{
    category, CapabilityKey, DiagnosticsThrottle, ForeignValue, RenderBox, StructureId,
};

use crate::host::CellContent;

/// Collision routing counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionStats {
    /// Cells answered with foreign shapes.
    pub routed: u64,
    /// Cells skipped (not micro-voxel or bridge inactive).
    pub skipped: u64,
    /// Cells whose shapes could not be obtained.
    pub failed: u64,
}

/// Routes collision queries to the micro-voxel module.
pub struct CollisionRouter {
    resolver: Arc<BindingResolver>,
    throttle: Arc<DiagnosticsThrottle>,
    capabilities: [CapabilityKey; 2],
    routed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl CollisionRouter {
    /// Creates a router.
    #[must_use]
    pub fn new(resolver: Arc<BindingResolver>, throttle: Arc<DiagnosticsThrottle>) -> Self {
        Self {
            resolver,
            throttle,
            capabilities: [
                CapabilityKey::collision_shapes(),
                CapabilityKey::bounding_box(),
            ],
            routed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Collision boxes of one cell, in cell-local units.
    ///
    /// Empty when the cell is not micro-voxel content, the bridge is
    /// inactive, or the foreign call failed. The host then keeps its own
    /// shape for the cell.
    pub fn collision_boxes(&self, structure: StructureId, cell: &CellContent) -> Vec<RenderBox> {
        let detector = self.resolver.detector();
        if !detector.both_present() || !detector.classify(&cell.block.class_name).is_micro_voxel() {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return Vec::new();
        }

        let outcome = self
            .resolver
            .resolve_first(&self.capabilities)
            .and_then(|binding| binding.invoke_boxes(&[ForeignValue::Handle(cell.block.clone())]));

        match outcome {
            Ok(boxes) => {
                self.routed.fetch_add(1, Ordering::Relaxed);
                boxes
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                if let Some(suppressed) = self.throttle.admit(category::COLLISION) {
                    warn!(%structure, cell = %cell.coord, %err, suppressed, "collision routing failed");
                }
                Vec::new()
            }
        }
    }

    /// Counters.
    #[must_use]
    pub fn stats(&self) -> CollisionStats {
        CollisionStats {
            routed: self.routed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for CollisionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionRouter")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxlink_binding::{
        CandidateCatalog, CapabilityDetector, ForeignRuntime, MockClass, MockRuntime,
    };
    use voxlink_core::{ArgShape, BridgeConfig, CellCoord, ForeignHandle};

    const TILES: &str = "team.microvoxel.common.block.TileBlockEntity";

    fn router(runtime: MockRuntime) -> CollisionRouter {
        let runtime: Arc<dyn ForeignRuntime> = Arc::new(runtime);
        let throttle = Arc::new(DiagnosticsThrottle::new(3000));
        let detector = Arc::new(CapabilityDetector::new(
            Arc::clone(&runtime),
            &BridgeConfig::default(),
            Arc::clone(&throttle),
        ));
        let resolver = Arc::new(BindingResolver::new(
            detector,
            runtime,
            CandidateCatalog::builtin(),
            Arc::clone(&throttle),
        ));
        CollisionRouter::new(resolver, throttle)
    }

    fn both() -> MockRuntime {
        MockRuntime::new().with_module("kinetics").with_module("microvoxel")
    }

    fn cell(class: &str) -> CellContent {
        CellContent::new(CellCoord::new(1, 2, 3), ForeignHandle::new(class, 4))
    }

    #[test]
    fn test_routes_collision_shapes() {
        let router = router(both().with_class(MockClass::new(TILES).with_method(
            "collisionBoxes",
            ArgShape::handle(),
            |_| Ok(ForeignValue::Boxes(vec![RenderBox::new([0.0; 3], [0.5; 3])])),
        )));
        let boxes = router.collision_boxes(StructureId(1), &cell(TILES));
        assert_eq!(boxes.len(), 1);
        assert_eq!(router.stats().routed, 1);
    }

    #[test]
    fn test_falls_back_to_bounding_box() {
        let router = router(both().with_class(MockClass::new(TILES).with_method(
            "boundingBox",
            ArgShape::handle(),
            |_| Ok(ForeignValue::Boxes(vec![RenderBox::unit()])),
        )));
        assert_eq!(router.collision_boxes(StructureId(1), &cell(TILES)), vec![RenderBox::unit()]);
    }

    #[test]
    fn test_failure_yields_empty() {
        let router = router(both().with_class(MockClass::new(TILES)));
        assert!(router.collision_boxes(StructureId(1), &cell(TILES)).is_empty());
        assert_eq!(router.stats().failed, 1);
    }

    #[test]
    fn test_non_foreign_cells_are_skipped() {
        let router = router(both());
        assert!(router
            .collision_boxes(StructureId(1), &cell("org.kinetics.content.Casing"))
            .is_empty());
        assert_eq!(router.stats().skipped, 1);
        assert_eq!(router.stats().failed, 0);
    }
}
