//! # Bridge Error Types
//!
//! `BindError` is the whole expected failure surface of the bridge. Nothing
//! raised inside Module A or Module B travels further than one of these.

use std::path::PathBuf;

use thiserror::Error;

use crate::capability::CapabilityKey;
use crate::module::ModuleId;

/// Failures of binding to, or calling into, a foreign module.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// The dependency is not loaded. Expected, not a fault.
    #[error("module {0} is not loaded")]
    ModuleAbsent(ModuleId),

    /// Every known API shape for the capability failed to resolve.
    #[error("no candidate matched {key} ({attempts} tried)")]
    NoCandidateMatched {
        /// The capability that could not be bound.
        key: CapabilityKey,
        /// Number of candidates attempted.
        attempts: usize,
        /// Failure reason of the last attempted candidate.
        last_reason: Option<String>,
    },

    /// A resolved binding failed or panicked at call time.
    #[error("invocation of {key} failed: {reason}")]
    InvocationFailed {
        /// The capability whose call failed.
        key: CapabilityKey,
        /// Description of the foreign fault.
        reason: String,
    },

    /// Enumerating structures or cells from the host failed.
    #[error("host query failed: {0}")]
    HostQueryFailed(String),
}

impl BindError {
    /// True for outcomes that are normal operation rather than faults.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::ModuleAbsent(_))
    }

    /// Short stable label, used for stats and throttle categories.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::ModuleAbsent(_) => "module-absent",
            Self::NoCandidateMatched { .. } => "no-candidate",
            Self::InvocationFailed { .. } => "invocation-failed",
            Self::HostQueryFailed(_) => "host-query-failed",
        }
    }
}

/// Result type for binding operations.
pub type BindResult<T> = Result<T, BindError>;

/// Errors loading or validating [`crate::BridgeConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for the config schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config parsed but violates a constraint.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
