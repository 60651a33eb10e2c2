//! Foreign module identities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two optional dependencies the bridge connects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum ModuleId {
    /// Module A: aggregates world content into movable composite structures.
    Assembly = 0,
    /// Module B: represents blocks as collections of sub-voxel shapes.
    MicroVoxel = 1,
}

impl ModuleId {
    /// Every module the bridge knows about, in index order.
    pub const ALL: [ModuleId; 2] = [ModuleId::Assembly, ModuleId::MicroVoxel];

    /// Dense index, usable for fixed-size per-module tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Stable lowercase name used in logs and config keys.
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Assembly => "assembly",
            Self::MicroVoxel => "micro-voxel",
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classification of a foreign object, computed once from its class name.
///
/// Replaces repeated runtime type probing: the detector matches the class
/// against each present module's namespace and callers branch on the enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ForeignObjectKind {
    /// A Module A composite structure.
    AssemblyStructure,
    /// A Module B block (tile collection).
    MicroVoxelBlock,
    /// Anything else, including content of absent modules.
    Unknown,
}

impl ForeignObjectKind {
    /// The kind of object owned by `module`.
    #[inline]
    #[must_use]
    pub const fn for_module(module: ModuleId) -> Self {
        match module {
            ModuleId::Assembly => Self::AssemblyStructure,
            ModuleId::MicroVoxel => Self::MicroVoxelBlock,
        }
    }

    /// True for Module B content.
    #[inline]
    #[must_use]
    pub const fn is_micro_voxel(self) -> bool {
        matches!(self, Self::MicroVoxelBlock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_dense() {
        for (i, module) in ModuleId::ALL.iter().enumerate() {
            assert_eq!(module.index(), i);
        }
    }

    #[test]
    fn test_kind_for_module() {
        assert!(ForeignObjectKind::for_module(ModuleId::MicroVoxel).is_micro_voxel());
        assert!(!ForeignObjectKind::for_module(ModuleId::Assembly).is_micro_voxel());
        assert!(!ForeignObjectKind::Unknown.is_micro_voxel());
    }
}
