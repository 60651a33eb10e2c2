//! Resolved bindings and the call-time panic boundary.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use voxlink_core::{BindError, BindResult, CapabilityKey, ForeignValue, RenderBox};

use crate::runtime::{ForeignFault, ForeignMethod};

/// A callable handle implementing one capability against the loaded module.
///
/// Created on the first successful resolution of its key and never mutated
/// afterwards (the call counter is statistics only).
pub struct ResolvedBinding {
    key: CapabilityKey,
    discovered_on_class: String,
    candidate: String,
    method: ForeignMethod,
    invocations: AtomicU64,
}

impl ResolvedBinding {
    /// Wraps a resolved foreign method.
    #[must_use]
    pub fn new(
        key: CapabilityKey,
        discovered_on_class: impl Into<String>,
        candidate: impl Into<String>,
        method: ForeignMethod,
    ) -> Self {
        Self {
            key,
            discovered_on_class: discovered_on_class.into(),
            candidate: candidate.into(),
            method,
            invocations: AtomicU64::new(0),
        }
    }

    /// Capability this binding implements.
    #[must_use]
    pub fn key(&self) -> &CapabilityKey {
        &self.key
    }

    /// Class the winning candidate resolved against.
    #[must_use]
    pub fn discovered_on_class(&self) -> &str {
        &self.discovered_on_class
    }

    /// Label of the candidate that produced this binding.
    #[must_use]
    pub fn candidate(&self) -> &str {
        &self.candidate
    }

    /// Number of times `invoke` has been called.
    #[must_use]
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    /// Calls the foreign method.
    ///
    /// # Errors
    ///
    /// Any foreign error or panic becomes [`BindError::InvocationFailed`].
    pub fn invoke(&self, args: &[ForeignValue]) -> BindResult<ForeignValue> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        match catch_unwind(AssertUnwindSafe(|| (self.method)(args))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(fault)) => Err(self.failed(fault.to_string())),
            Err(payload) => Err(self.failed(format!(
                "panicked: {}",
                panic_message(&*payload)
            ))),
        }
    }

    /// Calls the foreign method and expects geometry back.
    ///
    /// # Errors
    ///
    /// As [`invoke`](Self::invoke), plus a result of the wrong kind.
    pub fn invoke_boxes(&self, args: &[ForeignValue]) -> BindResult<Vec<RenderBox>> {
        let value = self.invoke(args)?;
        let kind = value.kind();
        value
            .into_boxes()
            .ok_or_else(|| self.failed(ForeignFault::UnexpectedResult(kind).to_string()))
    }

    fn failed(&self, reason: String) -> BindError {
        BindError::InvocationFailed {
            key: self.key.clone(),
            reason,
        }
    }
}

impl fmt::Debug for ResolvedBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedBinding")
            .field("key", &self.key)
            .field("discovered_on_class", &self.discovered_on_class)
            .field("candidate", &self.candidate)
            .field("invocations", &self.invocations())
            .finish_non_exhaustive()
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::foreign_method;
    use voxlink_core::ValueKind;

    fn binding(method: ForeignMethod) -> ResolvedBinding {
        ResolvedBinding::new(
            CapabilityKey::render_tile_collection(),
            "team.microvoxel.client.render.TileCollectionRenderer",
            "test",
            method,
        )
    }

    #[test]
    fn test_invoke_success() {
        let b = binding(foreign_method(|_| Ok(ForeignValue::Boxes(vec![RenderBox::unit()]))));
        assert_eq!(b.invoke_boxes(&[]).unwrap().len(), 1);
        assert_eq!(b.invocations(), 1);
    }

    #[test]
    fn test_foreign_error_becomes_invocation_failed() {
        let b = binding(foreign_method(|_| Err(ForeignFault::Raised("NullPointer".into()))));
        match b.invoke(&[]) {
            Err(BindError::InvocationFailed { reason, .. }) => {
                assert!(reason.contains("NullPointer"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_panic_is_contained() {
        let b = binding(foreign_method(|_| panic!("tile index out of range")));
        match b.invoke(&[]) {
            Err(BindError::InvocationFailed { reason, .. }) => {
                assert!(reason.contains("tile index out of range"));
            }
            other => panic!("unexpected {other:?}"),
        }
        // The binding stays usable after a panic.
        assert!(b.invoke(&[]).is_err());
        assert_eq!(b.invocations(), 2);
    }

    #[test]
    fn test_wrong_result_kind() {
        let b = binding(foreign_method(|_| Ok(ForeignValue::Int(4))));
        let err = b.invoke_boxes(&[]).unwrap_err();
        assert!(err.to_string().contains(ValueKind::Int.name()));
    }
}
