//! Host interfaces the hook reads from and draws into.
//!
//! The host owns the world, the transform stack and the draw buffers. The
//! bridge only sees them through these traits.

use thiserror::Error;
use voxlink_core::{CellCoord, ForeignHandle, StructureId};

use crate::artifact::RenderArtifact;

/// Failures reported by host callbacks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Structure enumeration failed.
    #[error("structure query failed: {0}")]
    Query(String),

    /// The draw buffers rejected a submission.
    #[error("buffer submission failed: {0}")]
    Submit(String),
}

/// One occupied cell of a structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellContent {
    /// Position inside the structure.
    pub coord: CellCoord,
    /// The block occupying the cell.
    pub block: ForeignHandle,
    /// Packed light sampled at the cell, if the host tracks it per cell.
    pub light: Option<u32>,
}

impl CellContent {
    /// A cell without its own light sample.
    #[must_use]
    pub fn new(coord: CellCoord, block: ForeignHandle) -> Self {
        Self {
            coord,
            block,
            light: None,
        }
    }

    /// Sets the per-cell light sample.
    #[must_use]
    pub fn with_light(mut self, light: u32) -> Self {
        self.light = Some(light);
        self
    }
}

/// One live composite structure, as the host sees it this frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureContext {
    /// Identity.
    pub id: StructureId,
    /// Occupied cells, in host order.
    pub cells: Vec<CellContent>,
}

impl StructureContext {
    /// Creates a structure context.
    #[must_use]
    pub fn new(id: StructureId, cells: Vec<CellContent>) -> Self {
        Self { id, cells }
    }
}

/// Read side: the structures currently active in the world.
pub trait StructureSource: Send + Sync {
    /// Structures to draw or scan this frame.
    ///
    /// # Errors
    ///
    /// [`HostError::Query`] when the host cannot answer; the caller abandons
    /// the frame.
    fn enumerate_active_structures(&self) -> Result<Vec<StructureContext>, HostError>;
}

/// The host's model-view transform stack.
pub trait TransformStack {
    /// Saves the current transform.
    fn push_pose(&mut self);
    /// Translates the current transform.
    fn translate(&mut self, offset: [f32; 3]);
    /// Restores the last saved transform.
    fn pop_pose(&mut self);
}

/// The host's draw buffers.
pub trait BufferSubmission {
    /// Submits one artifact at the current transform.
    ///
    /// # Errors
    ///
    /// [`HostError::Submit`] if the buffers reject the geometry.
    fn submit(&mut self, artifact: &RenderArtifact, light: u32, overlay: u32)
        -> Result<(), HostError>;
}

/// Per-frame values the host passes to the render stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameParams {
    /// Packed light used when a cell carries none.
    pub light: u32,
    /// Packed overlay coordinates.
    pub overlay: u32,
    /// Interpolation factor between ticks.
    pub partial_tick: f32,
}

impl Default for FrameParams {
    fn default() -> Self {
        Self {
            light: 0x00F0_00F0,
            overlay: 0,
            partial_tick: 0.0,
        }
    }
}
