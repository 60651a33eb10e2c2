//! # VOXLINK Rendering
//!
//! Draws micro-voxel cells embedded in assembly structures.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  enumerate   ┌──────────────┐  get / placeholder  ┌────────────────┐
//! │ Host world   │ ───────────► │ PipelineHook │ ──────────────────► │ RenderArtifact │
//! │ (structures) │              │ (render/tick)│ ◄────────────────── │     Cache      │
//! └──────────────┘              └──────┬───────┘      artifact       └────────────────┘
//!                                      │ resolve_first / invoke
//!                                      ▼
//!                               ┌──────────────┐
//!                               │   Binding    │
//!                               │   Resolver   │
//!                               └──────────────┘
//! ```
//!
//! ## Rules
//!
//! 1. A broken cell costs one placeholder, never the frame
//! 2. Placeholders never count as rendered
//! 3. Structure teardown is the only eviction

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod artifact;
pub mod cache;
pub mod collision;
pub mod events;
pub mod hook;
pub mod host;
pub mod mock;
pub mod stats;

pub use artifact::{CacheSlot, RenderArtifact};
pub use cache::{CacheStats, PendingState, RenderArtifactCache};
pub use collision::{CollisionRouter, CollisionStats};
pub use events::{BridgeEvent, BridgeEventBus, EventReceiver, EventSender, DEFAULT_EVENT_CAPACITY};
pub use hook::PipelineHook;
pub use host::{
    BufferSubmission, CellContent, FrameParams, HostError, StructureContext, StructureSource,
    TransformStack,
};
pub use mock::{MockStructureSource, RecordingBuffers, RecordingPoses, Submission};
pub use stats::{BridgeStats, FrameStats, ScanStats, SkipReason};
