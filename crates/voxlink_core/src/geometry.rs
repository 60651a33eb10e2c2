//! Spatial identifiers and the render box primitive.
//!
//! `RenderBox` is `Pod` so a finished artifact can be handed to the host's
//! draw buffers as raw bytes without a copy.

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// Opaque identity of one composite structure instance.
///
/// The host decides what it means (entity id, object identity). The bridge
/// only compares and hashes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StructureId(pub u64);

impl fmt::Display for StructureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "structure#{}", self.0)
    }
}

/// Cell coordinate local to a structure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellCoord {
    /// X axis.
    pub x: i32,
    /// Y axis.
    pub y: i32,
    /// Z axis.
    pub z: i32,
}

impl CellCoord {
    /// Creates a cell coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Translation of the cell's origin relative to the structure origin.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn offset(self) -> [f32; 3] {
        [self.x as f32, self.y as f32, self.z as f32]
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{},{}]", self.x, self.y, self.z)
    }
}

impl From<[i32; 3]> for CellCoord {
    fn from(v: [i32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// One axis-aligned box of sub-voxel geometry, in cell-local units (0..1).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RenderBox {
    /// Minimum corner.
    pub min: [f32; 3],
    /// Maximum corner.
    pub max: [f32; 3],
    /// Packed ARGB tint.
    pub color: u32,
    /// Foreign material / texture index.
    pub material: u32,
}

impl RenderBox {
    /// Creates a box with a white tint and material 0.
    #[must_use]
    pub const fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self {
            min,
            max,
            color: 0xFFFF_FFFF,
            material: 0,
        }
    }

    /// The full unit cube.
    #[must_use]
    pub const fn unit() -> Self {
        Self::new([0.0; 3], [1.0; 3])
    }

    /// Volume of the box; degenerate boxes report zero.
    #[must_use]
    pub fn volume(&self) -> f32 {
        (0..3)
            .map(|i| (self.max[i] - self.min[i]).max(0.0))
            .product()
    }
}
