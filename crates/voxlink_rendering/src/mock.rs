//! Mock host for testing (without a real game client).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use voxlink_core::StructureId;

use crate::artifact::RenderArtifact;
use crate::host::{BufferSubmission, HostError, StructureContext, StructureSource, TransformStack};

/// Structure source backed by a list the test mutates.
#[derive(Debug, Default)]
pub struct MockStructureSource {
    structures: RwLock<Vec<StructureContext>>,
    fails: AtomicBool,
    queries: AtomicU64,
}

impl MockStructureSource {
    /// No structures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a structure.
    #[must_use]
    pub fn with_structure(self, structure: StructureContext) -> Self {
        self.add_structure(structure);
        self
    }

    /// Adds a structure after construction.
    pub fn add_structure(&self, structure: StructureContext) {
        self.structures.write().push(structure);
    }

    /// Removes a structure. Returns true if it was present.
    pub fn remove_structure(&self, id: StructureId) -> bool {
        let mut structures = self.structures.write();
        let before = structures.len();
        structures.retain(|s| s.id != id);
        structures.len() != before
    }

    /// Makes enumeration fail.
    pub fn set_failure(&self, fail: bool) {
        self.fails.store(fail, Ordering::Relaxed);
    }

    /// Number of enumeration calls.
    #[must_use]
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
}

impl StructureSource for MockStructureSource {
    fn enumerate_active_structures(&self) -> Result<Vec<StructureContext>, HostError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        if self.fails.load(Ordering::Relaxed) {
            return Err(HostError::Query("mock world unloaded".into()));
        }
        Ok(self.structures.read().clone())
    }
}

/// Transform stack that records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingPoses {
    depth: usize,
    max_depth: usize,
    translations: Vec<[f32; 3]>,
}

impl RecordingPoses {
    /// Current push depth. Zero after a balanced pass.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Deepest push seen.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Every translation, in order.
    #[must_use]
    pub fn translations(&self) -> &[[f32; 3]] {
        &self.translations
    }
}

impl TransformStack for RecordingPoses {
    fn push_pose(&mut self) {
        self.depth += 1;
        self.max_depth = self.max_depth.max(self.depth);
    }

    fn translate(&mut self, offset: [f32; 3]) {
        self.translations.push(offset);
    }

    fn pop_pose(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// One recorded submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Boxes in the artifact.
    pub boxes: usize,
    /// Bytes handed over.
    pub bytes: usize,
    /// Light used.
    pub light: u32,
    /// Overlay used.
    pub overlay: u32,
}

/// Draw buffers that record submissions.
#[derive(Debug, Default)]
pub struct RecordingBuffers {
    submissions: Vec<Submission>,
    fail: bool,
}

impl RecordingBuffers {
    /// Makes every submission fail.
    pub fn fail_submissions(&mut self, fail: bool) {
        self.fail = fail;
    }

    /// Accepted submissions, in order.
    #[must_use]
    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    /// Forgets recorded submissions.
    pub fn clear(&mut self) {
        self.submissions.clear();
    }
}

impl BufferSubmission for RecordingBuffers {
    fn submit(
        &mut self,
        artifact: &RenderArtifact,
        light: u32,
        overlay: u32,
    ) -> Result<(), HostError> {
        if self.fail {
            return Err(HostError::Submit("mock buffer full".into()));
        }
        self.submissions.push(Submission {
            boxes: artifact.len(),
            bytes: artifact.as_bytes().len(),
            light,
            overlay,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::CellContent;
    use voxlink_core::{CellCoord, ForeignHandle};

    #[test]
    fn test_source_failure_and_removal() {
        let source = MockStructureSource::new().with_structure(StructureContext::new(
            StructureId(1),
            vec![CellContent::new(CellCoord::default(), ForeignHandle::new("a.B", 1))],
        ));
        assert_eq!(source.enumerate_active_structures().unwrap().len(), 1);
        source.set_failure(true);
        assert!(source.enumerate_active_structures().is_err());
        source.set_failure(false);
        assert!(source.remove_structure(StructureId(1)));
        assert!(!source.remove_structure(StructureId(1)));
        assert!(source.enumerate_active_structures().unwrap().is_empty());
        assert_eq!(source.queries(), 3);
    }

    #[test]
    fn test_poses_track_depth() {
        let mut poses = RecordingPoses::default();
        poses.push_pose();
        poses.push_pose();
        poses.pop_pose();
        poses.pop_pose();
        poses.pop_pose();
        assert_eq!(poses.depth(), 0);
        assert_eq!(poses.max_depth(), 2);
    }
}
