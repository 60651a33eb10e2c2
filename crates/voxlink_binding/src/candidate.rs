//! # Candidate Signatures
//!
//! A candidate is one historical API shape for a capability, expressed as a
//! trial closure over the runtime. The resolver tries candidates in order
//! and caches the first that resolves.
//!
//! Three builders cover the shapes seen across releases:
//!
//! - [`Candidate::method`]: a method with a known name on one of several
//!   class names (the class moved between releases).
//! - [`Candidate::chained`]: an accessor returns a foreign object, and the
//!   real method lives on that object's class (renderer lookups).
//! - [`Candidate::custom`]: anything else.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use voxlink_core::{ArgShape, CapabilityKey, ForeignValue, ValueKind};

use crate::runtime::{foreign_method, require_method, ForeignFault, ForeignMethod, ForeignRuntime};

/// A successful candidate attempt.
pub struct Resolution {
    /// The callable.
    pub method: ForeignMethod,
    /// Class it was found on.
    pub class_name: String,
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("class_name", &self.class_name)
            .finish_non_exhaustive()
    }
}

type Attempt =
    dyn Fn(&Arc<dyn ForeignRuntime>) -> Result<Resolution, ForeignFault> + Send + Sync;

/// One way of resolving a capability.
#[derive(Clone)]
pub struct Candidate {
    label: String,
    attempt: Arc<Attempt>,
}

impl Candidate {
    /// A candidate backed by an arbitrary trial closure.
    pub fn custom<F>(label: impl Into<String>, attempt: F) -> Self
    where
        F: Fn(&Arc<dyn ForeignRuntime>) -> Result<Resolution, ForeignFault>
            + Send
            + Sync
            + 'static,
    {
        Self {
            label: label.into(),
            attempt: Arc::new(attempt),
        }
    }

    /// `method` with `shape` on the first of `classes` that is loadable.
    #[must_use]
    pub fn method(classes: &[&str], method: &str, shape: ArgShape) -> Self {
        let classes: Vec<String> = classes.iter().map(|c| (*c).to_owned()).collect();
        let name = method.to_owned();
        let label = format!("{}#{}{}", classes.join("|"), name, shape);

        Self::custom(label, move |runtime| {
            let mut last = ForeignFault::ClassNotFound(classes.join("|"));
            for class_name in &classes {
                match runtime.find_class(class_name) {
                    Ok(class) => match require_method(class.as_ref(), &name, &shape) {
                        Ok(method) => {
                            return Ok(Resolution {
                                method,
                                class_name: class.name().to_owned(),
                            })
                        }
                        Err(fault) => last = fault,
                    },
                    Err(fault) => last = fault,
                }
            }
            Err(last)
        })
    }

    /// `accessor(args)` on `owner` returns a foreign object; `target` is then
    /// called on that object's class as `target(object, args...)`.
    ///
    /// The accessor is resolved eagerly. The target is resolved per returned
    /// class on first use and remembered.
    #[must_use]
    pub fn chained(owner: &str, accessor: &str, shape: ArgShape, target: &str) -> Self {
        let owner = owner.to_owned();
        let accessor = accessor.to_owned();
        let target = target.to_owned();
        let label = format!("{owner}#{accessor}{shape}->{target}");

        Self::custom(label, move |runtime| {
            let class = runtime.find_class(&owner)?;
            let accessor_method = require_method(class.as_ref(), &accessor, &shape)?;

            let mut target_kinds = vec![ValueKind::Handle];
            target_kinds.extend_from_slice(shape.kinds());
            let target_shape = ArgShape::new(target_kinds);

            let runtime = Arc::clone(runtime);
            let target = target.clone();
            let resolved: Mutex<HashMap<Arc<str>, ForeignMethod>> = Mutex::new(HashMap::new());

            let method = foreign_method(move |args| {
                let object = accessor_method(args)?;
                let Some(handle) = object.as_handle() else {
                    return Err(ForeignFault::UnexpectedResult(object.kind()));
                };
                let cached = resolved.lock().get(&handle.class_name).cloned();
                let method = match cached {
                    Some(m) => m,
                    None => {
                        let class = runtime.find_class(&handle.class_name)?;
                        let m = require_method(class.as_ref(), &target, &target_shape)?;
                        resolved
                            .lock()
                            .insert(Arc::clone(&handle.class_name), Arc::clone(&m));
                        m
                    }
                };
                let mut call_args = Vec::with_capacity(args.len() + 1);
                call_args.push(ForeignValue::Handle(handle.clone()));
                call_args.extend_from_slice(args);
                method(&call_args)
            });

            Ok(Resolution {
                method,
                class_name: class.name().to_owned(),
            })
        })
    }

    /// Human-readable description, used in logs.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Runs the trial.
    ///
    /// # Errors
    ///
    /// Returns the fault that made this shape inapplicable.
    pub fn attempt(&self, runtime: &Arc<dyn ForeignRuntime>) -> Result<Resolution, ForeignFault> {
        (self.attempt)(runtime)
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Candidate").field(&self.label).finish()
    }
}

/// Ordered candidate lists per capability.
#[derive(Debug, Clone, Default)]
pub struct CandidateCatalog {
    entries: HashMap<CapabilityKey, Vec<Candidate>>,
}

impl CandidateCatalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The known historical shapes of the micro-voxel module, newest first.
    #[must_use]
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        let handle = ArgShape::handle;

        catalog.push(
            CapabilityKey::render_tile_collection(),
            Candidate::method(
                &["team.microvoxel.client.render.TileCollectionRenderer"],
                "renderBoxes",
                handle(),
            ),
        );
        catalog.push(
            CapabilityKey::render_tile_collection(),
            Candidate::method(
                &[
                    "team.microvoxel.client.render.BlockTileRenderer",
                    "team.microvoxel.client.BlockTileRenderer",
                ],
                "getRenderBoxes",
                handle(),
            ),
        );
        catalog.push(
            CapabilityKey::render_tile_collection(),
            Candidate::method(
                &["team.microvoxel.common.block.BETiles"],
                "getRenderingBoxes",
                handle(),
            ),
        );

        catalog.push(
            CapabilityKey::block_entity_renderer(),
            Candidate::chained(
                "team.microvoxel.client.render.RendererRegistry",
                "rendererFor",
                handle(),
                "collectBoxes",
            ),
        );
        catalog.push(
            CapabilityKey::block_entity_renderer(),
            Candidate::chained(
                "team.microvoxel.client.render.TileRenderDispatcher",
                "getRenderer",
                handle(),
                "getBoxes",
            ),
        );

        catalog.push(
            CapabilityKey::collision_shapes(),
            Candidate::method(
                &[
                    "team.microvoxel.common.block.TileBlockEntity",
                    "team.microvoxel.common.block.BETiles",
                ],
                "collisionBoxes",
                handle(),
            ),
        );
        catalog.push(
            CapabilityKey::collision_shapes(),
            Candidate::method(
                &["team.microvoxel.common.block.BETiles"],
                "getCollisionBoxes",
                handle(),
            ),
        );

        catalog.push(
            CapabilityKey::bounding_box(),
            Candidate::method(
                &["team.microvoxel.common.block.TileBlockEntity"],
                "boundingBox",
                handle(),
            ),
        );

        catalog
    }

    /// Appends a candidate after the existing ones for `key`.
    pub fn push(&mut self, key: CapabilityKey, candidate: Candidate) {
        self.entries.entry(key).or_default().push(candidate);
    }

    /// The candidates for `key`, in priority order.
    #[must_use]
    pub fn candidates(&self, key: &CapabilityKey) -> &[Candidate] {
        self.entries.get(key).map_or(&[], Vec::as_slice)
    }

    /// Number of capabilities with at least one candidate.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no capability has candidates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
