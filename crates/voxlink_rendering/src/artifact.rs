//! Render artifacts and the cache's public slot view.

use std::sync::Arc;

use voxlink_core::{CapabilityKey, RenderBox};

/// Precomputed geometry for one foreign cell.
///
/// Immutable once built. Clones share the box slice.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderArtifact {
    boxes: Arc<[RenderBox]>,
    source: CapabilityKey,
}

impl RenderArtifact {
    /// Wraps the boxes returned by the capability `source`.
    #[must_use]
    pub fn new(boxes: Vec<RenderBox>, source: CapabilityKey) -> Self {
        Self {
            boxes: boxes.into(),
            source,
        }
    }

    /// The geometry.
    #[inline]
    #[must_use]
    pub fn boxes(&self) -> &[RenderBox] {
        &self.boxes
    }

    /// Number of boxes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// True for a cell whose foreign data produced no geometry.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Capability that produced the geometry.
    #[must_use]
    pub fn source(&self) -> &CapabilityKey {
        &self.source
    }

    /// Raw bytes for direct upload into host vertex buffers.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.boxes)
    }
}

/// What the cache holds for a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheSlot {
    /// Geometry is ready.
    Artifact(Arc<RenderArtifact>),
    /// The cell is known and its computation is pending, running or failed.
    /// Never rendered.
    Placeholder,
    /// Nothing recorded for this cell.
    Absent,
}

impl CacheSlot {
    /// The artifact, if ready.
    #[must_use]
    pub fn artifact(&self) -> Option<&Arc<RenderArtifact>> {
        match self {
            Self::Artifact(a) => Some(a),
            _ => None,
        }
    }

    /// True for [`CacheSlot::Placeholder`].
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }

    /// True for [`CacheSlot::Absent`].
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_bytes_cover_every_box() {
        let artifact = RenderArtifact::new(
            vec![RenderBox::unit(), RenderBox::new([0.0; 3], [0.5; 3])],
            CapabilityKey::render_tile_collection(),
        );
        assert_eq!(artifact.len(), 2);
        assert_eq!(artifact.as_bytes().len(), 2 * std::mem::size_of::<RenderBox>());
        assert_eq!(artifact.clone().boxes().as_ptr(), artifact.boxes().as_ptr());
    }

    #[test]
    fn test_slot_accessors() {
        let artifact = Arc::new(RenderArtifact::new(
            Vec::new(),
            CapabilityKey::render_tile_collection(),
        ));
        assert!(artifact.is_empty());
        assert!(CacheSlot::Artifact(artifact).artifact().is_some());
        assert!(CacheSlot::Placeholder.is_placeholder());
        assert!(CacheSlot::Absent.is_absent());
        assert!(CacheSlot::Placeholder.artifact().is_none());
    }
}
