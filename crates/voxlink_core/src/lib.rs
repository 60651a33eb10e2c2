//! # VOXLINK Core
//!
//! Shared vocabulary for the capability bridge between the kinematic assembly
//! subsystem (Module A) and the micro-voxel geometry subsystem (Module B).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      VOXLINK CORE                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ModuleId ──► CapabilityKey ──► BindError                   │
//! │      │              │                                       │
//! │      ▼              ▼                                       │
//! │  ForeignObjectKind  ForeignValue (dynamic call values)      │
//! │                                                             │
//! │  DiagnosticsThrottle ◄── Clock     BridgeConfig (TOML)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! 1. Nothing in this crate touches a foreign module
//! 2. Every shared type is `Send + Sync`
//! 3. The throttle never logs; callers log when it says yes

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod capability;
pub mod clock;
pub mod config;
pub mod error;
pub mod geometry;
pub mod module;
pub mod throttle;
pub mod value;

pub use capability::{ops, ArgShape, CapabilityKey};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{BridgeConfig, ModuleDescriptor, RenderConfig, ThrottleConfig};
pub use error::{BindError, BindResult, ConfigError, ConfigResult};
pub use geometry::{CellCoord, RenderBox, StructureId};
pub use module::{ForeignObjectKind, ModuleId};
pub use throttle::{category, DiagnosticsThrottle, ThrottleBucket, ThrottleSnapshot};
pub use value::{ForeignHandle, ForeignValue, ValueKind};
