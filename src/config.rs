use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/vm.json";

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub turbo_mode: bool,
    #[serde(default)]
    pub compatibility_mode: bool,
    #[serde(default = "RuntimeConfig::default_max_clones")]
    pub max_clones: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SerializationConfig {
    #[serde(default = "SerializationConfig::default_semver")]
    pub semver: String,
    #[serde(default)]
    pub agent: String,
    #[serde(default = "SerializationConfig::default_pretty")]
    pub pretty: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct VmConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub serialization: SerializationConfig,
}

#[derive(Debug, Clone, Default)]
pub struct VmConfigOverrides {
    pub turbo_mode: Option<bool>,
    pub compatibility_mode: Option<bool>,
    pub max_clones: Option<usize>,
}

impl RuntimeConfig {
    const fn default_max_clones() -> usize {
        crate::runtime::MAX_CLONES
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { turbo_mode: false, compatibility_mode: false, max_clones: Self::default_max_clones() }
    }
}

impl SerializationConfig {
    fn default_semver() -> String {
        "3.0.0".to_string()
    }

    const fn default_pretty() -> bool {
        true
    }
}

impl Default for SerializationConfig {
    fn default() -> Self {
        Self { semver: Self::default_semver(), agent: String::new(), pretty: Self::default_pretty() }
    }
}

impl VmConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!("Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &VmConfigOverrides) {
        if let Some(turbo) = overrides.turbo_mode {
            self.runtime.turbo_mode = turbo;
        }
        if let Some(compat) = overrides.compatibility_mode {
            self.runtime.compatibility_mode = compat;
        }
        if let Some(max_clones) = overrides.max_clones {
            self.runtime.max_clones = max_clones;
        }
    }
}

impl VmConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.turbo_mode.is_none() && self.compatibility_mode.is_none() && self.max_clones.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.turbo_mode.is_some() {
            fields.push("turbo");
        }
        if self.compatibility_mode.is_some() {
            fields.push("compat");
        }
        if self.max_clones.is_some() {
            fields.push("max-clones");
        }
        fields
    }
}
