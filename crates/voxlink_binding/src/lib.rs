//! # VOXLINK Binding
//!
//! Capability detection and binding resolution against foreign modules that
//! publish no stable contract.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐   detect(module)   ┌─────────────────────┐
//! │   Binding    │ ─────────────────► │ CapabilityDetector  │
//! │   Resolver   │                    │  (once per module)  │
//! │              │   candidates(key)  ├─────────────────────┤
//! │  DashMap     │ ─────────────────► │  CandidateCatalog   │
//! │  key→binding │                    │  (historical shapes)│
//! └──────┬───────┘                    └─────────────────────┘
//!        │ attempt(runtime)
//!        ▼
//! ┌──────────────┐
//! │ForeignRuntime│ ──► Module A / Module B (host-provided lookup)
//! └──────────────┘
//! ```
//!
//! ## Rules
//!
//! 1. The first caller of `detect` pays for detection; everyone else reads
//! 2. Only successful resolutions are cached
//! 3. Every foreign call is wrapped in `catch_unwind`

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod binding;
pub mod candidate;
pub mod detector;
pub mod mock;
pub mod resolver;
pub mod runtime;

pub use binding::{panic_message, ResolvedBinding};
pub use candidate::{Candidate, CandidateCatalog, Resolution};
pub use detector::{
    default_strategies, CapabilityDetector, DependencyHandle, DetectionStrategy,
    DetectionStrategyKind, KnownClassProbe, PackagePrefixScan, RegistryQuery, VersionHints,
};
pub use mock::{MockClass, MockRuntime};
pub use resolver::{BindingResolver, ResolverStats};
pub use runtime::{foreign_method, require_method, ForeignClass, ForeignFault, ForeignMethod, ForeignRuntime};
