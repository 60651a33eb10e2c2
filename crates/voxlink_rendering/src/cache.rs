//! # Render Artifact Cache
//!
//! Two-level map: structure → cell → entry. Each structure owns its own
//! cell map behind its own lock, so work on one structure never blocks
//! another. The outer map is only write-locked to add or drop a structure.
//!
//! ## Cell lifecycle
//!
//! ```text
//!   Absent ──ensure_placeholder──► Pending ──try_claim──► InFlight
//!                                                            │
//!                                   ┌──────── complete ──────┤
//!                                   ▼                        ▼ mark_failed
//!                                 Ready                    Failed
//!
//!   any state ──invalidate_structure──► Absent
//! ```
//!
//! Pending, InFlight and Failed all read as [`CacheSlot::Placeholder`].
//! Only `try_claim` moves a cell into InFlight, so at most one computation
//! per cell runs at a time.
//!
//! Every claim is stamped with the caller's catalog generation. A Failed
//! cell is claimable again once the caller presents a newer generation,
//! so a failure is retried after the candidate catalog grows and not on
//! every frame in between.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use voxlink_core::{CellCoord, StructureId};

use crate::artifact::{CacheSlot, RenderArtifact};

/// Internal state of a placeholder cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Discovered, no computation attempted yet.
    Pending,
    /// A thread is computing the artifact.
    InFlight,
    /// The last computation failed.
    Failed,
}

#[derive(Debug, Clone)]
enum Entry {
    Placeholder {
        state: PendingState,
        /// Catalog generation of the last claim.
        generation: u64,
    },
    Ready(Arc<RenderArtifact>),
}

type CellMap = RwLock<HashMap<CellCoord, Entry>>;

/// Cache occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Structures with at least one recorded cell.
    pub structures: usize,
    /// Cells with ready geometry.
    pub artifacts: usize,
    /// Cells waiting on, or failed, computation.
    pub placeholders: usize,
    /// Placeholders whose computation failed.
    pub failed: usize,
    /// Total boxes across ready artifacts.
    pub boxes: usize,
    /// Structures dropped by `invalidate_structure` since creation.
    pub invalidations: u64,
}

/// Per-structure cache of precomputed cell geometry.
#[derive(Debug, Default)]
pub struct RenderArtifactCache {
    structures: RwLock<HashMap<StructureId, Arc<CellMap>>>,
    invalidations: AtomicU64,
}

impl RenderArtifactCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cells(&self, structure: StructureId) -> Option<Arc<CellMap>> {
        self.structures.read().get(&structure).cloned()
    }

    fn cells_or_insert(&self, structure: StructureId) -> Arc<CellMap> {
        if let Some(cells) = self.cells(structure) {
            return cells;
        }
        Arc::clone(self.structures.write().entry(structure).or_default())
    }

    /// Looks up a cell.
    #[must_use]
    pub fn get(&self, structure: StructureId, cell: CellCoord) -> CacheSlot {
        let Some(cells) = self.cells(structure) else {
            return CacheSlot::Absent;
        };
        let slot = match cells.read().get(&cell) {
            Some(Entry::Ready(artifact)) => CacheSlot::Artifact(Arc::clone(artifact)),
            Some(Entry::Placeholder { .. }) => CacheSlot::Placeholder,
            None => CacheSlot::Absent,
        };
        slot
    }

    /// Placeholder state of a cell, `None` if the cell is absent or ready.
    #[must_use]
    pub fn pending_state(&self, structure: StructureId, cell: CellCoord) -> Option<PendingState> {
        let cells = self.cells(structure)?;
        let state = match cells.read().get(&cell) {
            Some(Entry::Placeholder { state, .. }) => Some(*state),
            _ => None,
        };
        state
    }

    /// Records the cell as pending unless something is already there.
    /// Returns true if this call inserted the placeholder.
    pub fn ensure_placeholder(&self, structure: StructureId, cell: CellCoord) -> bool {
        let cells = self.cells_or_insert(structure);
        let mut guard = cells.write();
        if guard.contains_key(&cell) {
            return false;
        }
        guard.insert(
            cell,
            Entry::Placeholder {
                state: PendingState::Pending,
                generation: 0,
            },
        );
        true
    }

    /// Moves a cell to in-flight. Pending cells are always claimable;
    /// failed cells only when `generation` is newer than the one they
    /// failed under. Exactly one caller wins; everyone else gets false.
    pub fn try_claim(&self, structure: StructureId, cell: CellCoord, generation: u64) -> bool {
        let Some(cells) = self.cells(structure) else {
            return false;
        };
        let mut guard = cells.write();
        let Some(Entry::Placeholder {
            state,
            generation: claimed,
        }) = guard.get_mut(&cell)
        else {
            return false;
        };
        let claimable = match *state {
            PendingState::Pending => true,
            PendingState::Failed => generation > *claimed,
            PendingState::InFlight => false,
        };
        if claimable {
            *state = PendingState::InFlight;
            *claimed = generation;
        }
        claimable
    }

    /// Marks a claimed cell failed. The cell keeps reading as a placeholder.
    pub fn mark_failed(&self, structure: StructureId, cell: CellCoord) {
        if let Some(cells) = self.cells(structure) {
            if let Some(Entry::Placeholder { state, .. }) = cells.write().get_mut(&cell) {
                *state = PendingState::Failed;
            }
        }
    }

    /// Stores a finished artifact, replacing whatever the cell held.
    pub fn populate(
        &self,
        structure: StructureId,
        cell: CellCoord,
        artifact: RenderArtifact,
    ) -> Arc<RenderArtifact> {
        let artifact = Arc::new(artifact);
        self.cells_or_insert(structure)
            .write()
            .insert(cell, Entry::Ready(Arc::clone(&artifact)));
        artifact
    }

    /// Stores a finished artifact only if the cell still holds a placeholder.
    ///
    /// A structure torn down while the computation ran has no placeholder
    /// left, so its result is dropped instead of resurrecting the structure.
    pub fn complete(
        &self,
        structure: StructureId,
        cell: CellCoord,
        artifact: RenderArtifact,
    ) -> Option<Arc<RenderArtifact>> {
        let cells = self.cells(structure)?;
        let mut guard = cells.write();
        let entry = guard.get_mut(&cell)?;
        if !matches!(entry, Entry::Placeholder { .. }) {
            return None;
        }
        let artifact = Arc::new(artifact);
        *entry = Entry::Ready(Arc::clone(&artifact));
        Some(artifact)
    }

    /// Drops every entry of a structure. Returns the number of cells removed.
    pub fn invalidate_structure(&self, structure: StructureId) -> usize {
        let removed = self.structures.write().remove(&structure);
        let Some(cells) = removed else {
            return 0;
        };
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        let count = cells.read().len();
        count
    }

    /// Drops every structure. Returns the number of structures removed.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = self.structures.write().drain().collect();
        self.invalidations
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        drained.len()
    }

    /// Structures currently holding entries, sorted.
    #[must_use]
    pub fn structure_ids(&self) -> Vec<StructureId> {
        let mut ids: Vec<StructureId> = self.structures.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of recorded cells of one structure.
    #[must_use]
    pub fn cell_count(&self, structure: StructureId) -> usize {
        self.cells(structure).map_or(0, |cells| cells.read().len())
    }

    /// Occupancy snapshot.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let maps: Vec<Arc<CellMap>> = self.structures.read().values().cloned().collect();
        let mut stats = CacheStats {
            structures: maps.len(),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            ..CacheStats::default()
        };
        for cells in &maps {
            for entry in cells.read().values() {
                match entry {
                    Entry::Ready(artifact) => {
                        stats.artifacts += 1;
                        stats.boxes += artifact.len();
                    }
                    Entry::Placeholder { state, .. } => {
                        stats.placeholders += 1;
                        if *state == PendingState::Failed {
                            stats.failed += 1;
                        }
                    }
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use voxlink_core::{CapabilityKey, RenderBox};

    const S1: StructureId = StructureId(1);
    const S2: StructureId = StructureId(2);
    const C: CellCoord = CellCoord::new(0, 1, 0);

    fn artifact(n: usize) -> RenderArtifact {
        RenderArtifact::new(vec![RenderBox::unit(); n], CapabilityKey::render_tile_collection())
    }

    #[test]
    fn test_placeholder_is_idempotent() {
        let cache = RenderArtifactCache::new();
        assert!(cache.get(S1, C).is_absent());
        assert!(cache.ensure_placeholder(S1, C));
        assert!(!cache.ensure_placeholder(S1, C));
        assert!(cache.get(S1, C).is_placeholder());
        assert_eq!(cache.pending_state(S1, C), Some(PendingState::Pending));
    }

    #[test]
    fn test_placeholder_never_overwrites_artifact() {
        let cache = RenderArtifactCache::new();
        cache.populate(S1, C, artifact(3));
        assert!(!cache.ensure_placeholder(S1, C));
        assert_eq!(cache.get(S1, C).artifact().map(|a| a.len()), Some(3));
    }

    #[test]
    fn test_populate_replaces() {
        let cache = RenderArtifactCache::new();
        cache.ensure_placeholder(S1, C);
        cache.populate(S1, C, artifact(1));
        cache.populate(S1, C, artifact(2));
        assert_eq!(cache.get(S1, C).artifact().map(|a| a.len()), Some(2));
    }

    #[test]
    fn test_claim_lifecycle() {
        let cache = RenderArtifactCache::new();
        assert!(!cache.try_claim(S1, C, 0));
        cache.ensure_placeholder(S1, C);
        assert!(cache.try_claim(S1, C, 0));
        assert!(!cache.try_claim(S1, C, 0));
        cache.mark_failed(S1, C);
        assert_eq!(cache.pending_state(S1, C), Some(PendingState::Failed));
        assert!(!cache.try_claim(S1, C, 0));
        assert!(cache.get(S1, C).is_placeholder());
        assert_eq!(cache.stats().failed, 1);
    }

    #[test]
    fn test_failed_cell_reclaimable_under_newer_generation() {
        let cache = RenderArtifactCache::new();
        cache.ensure_placeholder(S1, C);
        assert!(cache.try_claim(S1, C, 2));
        cache.mark_failed(S1, C);

        assert!(!cache.try_claim(S1, C, 1));
        assert!(!cache.try_claim(S1, C, 2));
        assert!(cache.try_claim(S1, C, 3));
        assert_eq!(cache.pending_state(S1, C), Some(PendingState::InFlight));
        // In flight again: a further bump does not steal the claim.
        assert!(!cache.try_claim(S1, C, 4));

        cache.mark_failed(S1, C);
        assert!(!cache.try_claim(S1, C, 3));
        assert!(cache.try_claim(S1, C, 4));
        assert!(cache.complete(S1, C, artifact(1)).is_some());
        assert!(!cache.try_claim(S1, C, 5));
    }

    #[test]
    fn test_complete_after_teardown_is_dropped() {
        let cache = RenderArtifactCache::new();
        cache.ensure_placeholder(S1, C);
        assert!(cache.try_claim(S1, C, 0));
        cache.invalidate_structure(S1);
        assert!(cache.complete(S1, C, artifact(1)).is_none());
        assert!(cache.get(S1, C).is_absent());
        assert!(cache.structure_ids().is_empty());
    }

    #[test]
    fn test_complete_fills_placeholder() {
        let cache = RenderArtifactCache::new();
        cache.ensure_placeholder(S1, C);
        assert!(cache.try_claim(S1, C, 0));
        assert!(cache.complete(S1, C, artifact(4)).is_some());
        assert_eq!(cache.get(S1, C).artifact().map(|a| a.len()), Some(4));
        assert_eq!(cache.pending_state(S1, C), None);
    }

    #[test]
    fn test_invalidate_is_scoped_to_one_structure() {
        let cache = RenderArtifactCache::new();
        cache.populate(S1, C, artifact(1));
        cache.ensure_placeholder(S1, CellCoord::new(1, 1, 1));
        cache.populate(S2, C, artifact(1));

        assert_eq!(cache.invalidate_structure(S1), 2);
        assert!(cache.get(S1, C).is_absent());
        assert!(cache.get(S2, C).artifact().is_some());
        assert_eq!(cache.invalidate_structure(S1), 0);

        let stats = cache.stats();
        assert_eq!(stats.structures, 1);
        assert_eq!(stats.artifacts, 1);
        assert_eq!(stats.invalidations, 1);
    }

    #[test]
    fn test_stats_never_count_placeholders_as_artifacts() {
        let cache = RenderArtifactCache::new();
        cache.ensure_placeholder(S1, C);
        cache.populate(S2, C, artifact(5));
        let stats = cache.stats();
        assert_eq!(stats.placeholders, 1);
        assert_eq!(stats.artifacts, 1);
        assert_eq!(stats.boxes, 5);
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let cache = Arc::new(RenderArtifactCache::new());
        let winners = Arc::new(AtomicUsize::new(0));
        let inserted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let winners = Arc::clone(&winners);
                let inserted = Arc::clone(&inserted);
                thread::spawn(move || {
                    if cache.ensure_placeholder(S1, C) {
                        inserted.fetch_add(1, Ordering::Relaxed);
                    }
                    if cache.try_claim(S1, C, 0) {
                        winners.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(inserted.load(Ordering::Relaxed), 1);
        assert_eq!(winners.load(Ordering::Relaxed), 1);
        assert_eq!(cache.pending_state(S1, C), Some(PendingState::InFlight));
    }

    #[test]
    fn test_clear() {
        let cache = RenderArtifactCache::new();
        cache.populate(S1, C, artifact(1));
        cache.populate(S2, C, artifact(1));
        assert_eq!(cache.clear(), 2);
        assert_eq!(cache.stats().structures, 0);
        assert_eq!(cache.cell_count(S1), 0);
    }
}
