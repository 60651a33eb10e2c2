//! # Capability Keys
//!
//! A capability is a named cross-module operation the bridge needs, for
//! example "render a tile collection". The key is a plain value: two keys with
//! the same fields are the same capability. It is only ever used to index the
//! binding cache and the candidate catalog.

use std::borrow::Cow;
use std::fmt;

use crate::module::ModuleId;
use crate::value::ValueKind;

/// Well-known operation names.
pub mod ops {
    /// Produce render boxes for a whole tile collection (Module B).
    pub const RENDER_TILE_COLLECTION: &str = "render-tile-collection";
    /// Fetch the block-entity renderer and ask it for geometry (Module B).
    pub const BLOCK_ENTITY_RENDERER: &str = "block-entity-renderer";
    /// Collision shapes of a tile collection (Module B).
    pub const COLLISION_SHAPES: &str = "collision-shapes";
    /// Coarse bounding box of a tile collection (Module B).
    pub const BOUNDING_BOX: &str = "bounding-box";
}

/// Expected argument kinds of a call.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArgShape(Vec<ValueKind>);

impl ArgShape {
    /// Creates a shape from argument kinds.
    #[must_use]
    pub fn new(kinds: impl Into<Vec<ValueKind>>) -> Self {
        Self(kinds.into())
    }

    /// A call taking a single foreign object.
    #[must_use]
    pub fn handle() -> Self {
        Self(vec![ValueKind::Handle])
    }

    /// The argument kinds.
    #[must_use]
    pub fn kinds(&self) -> &[ValueKind] {
        &self.0
    }

    /// Number of arguments.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// True if `args` has exactly this shape.
    #[must_use]
    pub fn accepts(&self, args: &[crate::value::ForeignValue]) -> bool {
        self.0.len() == args.len() && self.0.iter().zip(args).all(|(k, a)| *k == a.kind())
    }
}

impl fmt::Display for ArgShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, kind) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(kind.name())?;
        }
        f.write_str(")")
    }
}

/// Identifies one desired cross-module operation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CapabilityKey {
    /// Module that implements the operation.
    pub module: ModuleId,
    /// Operation name, see [`ops`].
    pub operation: Cow<'static, str>,
    /// Argument shape the bridge will call it with.
    pub shape: ArgShape,
}

impl CapabilityKey {
    /// Creates a key.
    #[must_use]
    pub fn new(module: ModuleId, operation: impl Into<Cow<'static, str>>, shape: ArgShape) -> Self {
        Self {
            module,
            operation: operation.into(),
            shape,
        }
    }

    /// `micro-voxel::render-tile-collection(handle)`.
    #[must_use]
    pub fn render_tile_collection() -> Self {
        Self::new(ModuleId::MicroVoxel, ops::RENDER_TILE_COLLECTION, ArgShape::handle())
    }

    /// `micro-voxel::block-entity-renderer(handle)`.
    #[must_use]
    pub fn block_entity_renderer() -> Self {
        Self::new(ModuleId::MicroVoxel, ops::BLOCK_ENTITY_RENDERER, ArgShape::handle())
    }

    /// `micro-voxel::collision-shapes(handle)`.
    #[must_use]
    pub fn collision_shapes() -> Self {
        Self::new(ModuleId::MicroVoxel, ops::COLLISION_SHAPES, ArgShape::handle())
    }

    /// `micro-voxel::bounding-box(handle)`.
    #[must_use]
    pub fn bounding_box() -> Self {
        Self::new(ModuleId::MicroVoxel, ops::BOUNDING_BOX, ArgShape::handle())
    }
}

impl fmt::Display for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}{}", self.module, self.operation, self.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ForeignHandle, ForeignValue};
    use std::collections::HashSet;

    #[test]
    fn test_key_identity_is_structural() {
        let a = CapabilityKey::render_tile_collection();
        let b = CapabilityKey::new(
            ModuleId::MicroVoxel,
            String::from("render-tile-collection"),
            ArgShape::new(vec![ValueKind::Handle]),
        );
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            CapabilityKey::render_tile_collection().to_string(),
            "micro-voxel::render-tile-collection(handle)"
        );
        let shape = ArgShape::new(vec![ValueKind::Handle, ValueKind::Int]);
        assert_eq!(shape.to_string(), "(handle, int)");
    }

    #[test]
    fn test_shape_accepts() {
        let shape = ArgShape::handle();
        let ok = [ForeignValue::Handle(ForeignHandle::new("x.Y", 1))];
        assert!(shape.accepts(&ok));
        assert!(!shape.accepts(&[ForeignValue::Int(1)]));
        assert!(!shape.accepts(&[]));
    }
}
