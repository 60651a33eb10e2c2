//! # VOXLINK
//!
//! Runtime capability bridge between the kinematic assembly subsystem
//! (Module A) and the micro-voxel geometry subsystem (Module B).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          VOXLINK BRIDGE                             │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  ┌─────────────────┐     ┌─────────────────┐     ┌───────────────┐  │
//! │  │  voxlink_core   │     │ voxlink_binding │     │   voxlink_    │  │
//! │  │                 │────>│                 │────>│   rendering   │  │
//! │  │  • Throttle     │     │  • Detector     │     │  • Cache      │  │
//! │  │  • Config       │     │  • Resolver     │     │  • Hook       │  │
//! │  │  • Errors       │     │  • Candidates   │     │  • Collision  │  │
//! │  └─────────────────┘     └─────────────────┘     └───────────────┘  │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `bridge`: the `CapabilityBridge` composition root
//! - `telemetry`: default `tracing` subscriber for binaries

pub mod bridge;
pub mod telemetry;

// Re-export the units
pub use voxlink_binding as binding;
pub use voxlink_core as core;
pub use voxlink_rendering as rendering;

// Re-export commonly used types
pub use bridge::{BindingStatus, BridgeBuilder, BridgeStatus, CapabilityBridge};
pub use telemetry::{init_tracing, DEFAULT_FILTER};
