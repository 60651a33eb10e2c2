//! Dynamic values crossing the foreign call boundary.
//!
//! Foreign methods are not linked at compile time, so arguments and results
//! travel as a small tagged union. `ValueKind` is the tag alone and is what
//! call shapes are written in.

use std::fmt;
use std::sync::Arc;

use crate::geometry::RenderBox;

/// Tag of a [`ForeignValue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueKind {
    /// No value.
    Unit,
    /// Boolean.
    Bool,
    /// Signed integer.
    Int,
    /// Floating point.
    Float,
    /// String.
    Str,
    /// Geometry as render boxes.
    Boxes,
    /// Opaque reference to a foreign object.
    Handle,
    /// Heterogeneous list.
    List,
}

impl ValueKind {
    /// Lowercase name used in shape signatures.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Boxes => "boxes",
            Self::Handle => "handle",
            Self::List => "list",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque reference to an object living inside a foreign module.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ForeignHandle {
    /// Fully-qualified class name of the referenced object.
    pub class_name: Arc<str>,
    /// Host-assigned object identity.
    pub id: u64,
}

impl ForeignHandle {
    /// Creates a handle.
    #[must_use]
    pub fn new(class_name: impl Into<Arc<str>>, id: u64) -> Self {
        Self {
            class_name: class_name.into(),
            id,
        }
    }
}

/// A value passed to or returned from a foreign method.
#[derive(Clone, Debug, PartialEq)]
pub enum ForeignValue {
    /// No value.
    Unit,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// String.
    Str(String),
    /// Geometry.
    Boxes(Vec<RenderBox>),
    /// Foreign object reference.
    Handle(ForeignHandle),
    /// List of values.
    List(Vec<ForeignValue>),
}

impl ForeignValue {
    /// The tag of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Unit => ValueKind::Unit,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Str(_) => ValueKind::Str,
            Self::Boxes(_) => ValueKind::Boxes,
            Self::Handle(_) => ValueKind::Handle,
            Self::List(_) => ValueKind::List,
        }
    }

    /// Borrows the geometry if this is a `Boxes` value.
    #[must_use]
    pub fn as_boxes(&self) -> Option<&[RenderBox]> {
        match self {
            Self::Boxes(b) => Some(b),
            _ => None,
        }
    }

    /// Extracts geometry. A list of `Boxes` values is flattened, which is how
    /// some releases return per-tile groups.
    #[must_use]
    pub fn into_boxes(self) -> Option<Vec<RenderBox>> {
        match self {
            Self::Boxes(b) => Some(b),
            Self::List(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(item.into_boxes()?);
                }
                Some(out)
            }
            _ => None,
        }
    }

    /// Borrows the handle if this is a `Handle` value.
    #[must_use]
    pub fn as_handle(&self) -> Option<&ForeignHandle> {
        match self {
            Self::Handle(h) => Some(h),
            _ => None,
        }
    }
}

impl From<ForeignHandle> for ForeignValue {
    fn from(h: ForeignHandle) -> Self {
        Self::Handle(h)
    }
}

impl From<Vec<RenderBox>> for ForeignValue {
    fn from(b: Vec<RenderBox>) -> Self {
        Self::Boxes(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(ForeignValue::Unit.kind(), ValueKind::Unit);
        assert_eq!(ForeignValue::Int(3).kind(), ValueKind::Int);
        let h = ForeignHandle::new("a.B", 1);
        assert_eq!(ForeignValue::from(h).kind(), ValueKind::Handle);
    }

    #[test]
    fn test_into_boxes_flattens_lists() {
        let nested = ForeignValue::List(vec![
            ForeignValue::Boxes(vec![RenderBox::unit()]),
            ForeignValue::Boxes(vec![RenderBox::unit(), RenderBox::unit()]),
        ]);
        assert_eq!(nested.into_boxes().map(|b| b.len()), Some(3));
    }

    #[test]
    fn test_into_boxes_rejects_mixed_lists() {
        let mixed = ForeignValue::List(vec![
            ForeignValue::Boxes(vec![RenderBox::unit()]),
            ForeignValue::Int(1),
        ]);
        assert!(mixed.into_boxes().is_none());
    }
}
