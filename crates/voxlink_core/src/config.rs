//! # Bridge Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file (or no file) yields a working bridge.
//!
//! ```toml
//! [throttle]
//! default_interval_ms = 3000
//! overrides = { render-cell = 5000 }
//!
//! [micro_voxel]
//! registry_ids = ["microvoxel"]
//! known_classes = ["team.microvoxel.common.block.TileBlockEntity"]
//! package_prefixes = ["team.microvoxel."]
//!
//! [render]
//! stage = "after-solid-geometry"
//! max_cells_per_frame = 0
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::module::ModuleId;

/// Default spacing between diagnostics of one category.
pub const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 3000;

/// Default render stage name.
pub const DEFAULT_RENDER_STAGE: &str = "after-solid-geometry";

/// Top-level bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Diagnostics throttle settings.
    pub throttle: ThrottleConfig,
    /// Detection data for Module A.
    pub assembly: ModuleDescriptor,
    /// Detection data for Module B.
    pub micro_voxel: ModuleDescriptor,
    /// Render hook settings.
    pub render: RenderConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            throttle: ThrottleConfig::default(),
            assembly: ModuleDescriptor::default_for(ModuleId::Assembly),
            micro_voxel: ModuleDescriptor::default_for(ModuleId::MicroVoxel),
            render: RenderConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Detection data for `module`.
    #[must_use]
    pub fn descriptor(&self, module: ModuleId) -> &ModuleDescriptor {
        match module {
            ModuleId::Assembly => &self.assembly,
            ModuleId::MicroVoxel => &self.micro_voxel,
        }
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.throttle.default_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "throttle.default_interval_ms must be greater than zero".into(),
            ));
        }
        for module in ModuleId::ALL {
            if self.descriptor(module).is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "module {module} has no registry ids, known classes or package prefixes"
                )));
            }
        }
        if self.render.stage.trim().is_empty() {
            return Err(ConfigError::Invalid("render.stage must not be empty".into()));
        }
        Ok(())
    }
}

/// Throttle intervals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Interval applied to every category without an override.
    pub default_interval_ms: u64,
    /// Per-category intervals.
    pub overrides: BTreeMap<String, u64>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: DEFAULT_THROTTLE_INTERVAL_MS,
            overrides: BTreeMap::new(),
        }
    }
}

/// How to recognise one foreign module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleDescriptor {
    /// Identifiers the host's plugin registry may list the module under.
    pub registry_ids: Vec<String>,
    /// Fully-qualified class names from different historical releases.
    pub known_classes: Vec<String>,
    /// Namespace prefixes owned by the module.
    pub package_prefixes: Vec<String>,
}

impl ModuleDescriptor {
    /// Built-in detection data for `module`.
    #[must_use]
    pub fn default_for(module: ModuleId) -> Self {
        let owned = |v: &[&str]| -> Vec<String> { v.iter().map(|s| (*s).to_owned()).collect() };
        match module {
            ModuleId::Assembly => Self {
                registry_ids: owned(&["kinetics", "kinetic_assembly"]),
                known_classes: owned(&[
                    "org.kinetics.content.contraptions.AbstractContraptionEntity",
                    "org.kinetics.content.contraptions.Contraption",
                    "org.kinetics.foundation.contraption.Contraption",
                ]),
                package_prefixes: owned(&["org.kinetics."]),
            },
            ModuleId::MicroVoxel => Self {
                registry_ids: owned(&["microvoxel", "microvoxel_core"]),
                known_classes: owned(&[
                    "team.microvoxel.common.block.TileBlockEntity",
                    "team.microvoxel.common.block.BETiles",
                    "team.microvoxel.block.TileEntityTiles",
                ]),
                package_prefixes: owned(&["team.microvoxel."]),
            },
        }
    }

    /// True if no strategy has anything to look for.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry_ids.is_empty()
            && self.known_classes.is_empty()
            && self.package_prefixes.is_empty()
    }

    /// True if `class_name` lies in one of the module's namespaces.
    #[must_use]
    pub fn owns_class(&self, class_name: &str) -> bool {
        self.package_prefixes
            .iter()
            .any(|p| class_name.starts_with(p.as_str()))
            || self.known_classes.iter().any(|c| c == class_name)
    }
}

/// Render hook settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Host render stage the hook runs at.
    pub stage: String,
    /// Upper bound on foreign cells visited per frame (0 = unlimited).
    pub max_cells_per_frame: usize,
    /// Whether the tick scan also computes artifacts, not just placeholders.
    pub compute_on_scan: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            stage: DEFAULT_RENDER_STAGE.to_owned(),
            max_cells_per_frame: 0,
            compute_on_scan: false,
        }
    }
}
