//! Analysis configuration
//!
//! Read from the `[profiler]` table of a TOML file:
//!
//! ```toml
//! [profiler]
//! manifest_glob = "/opt/f0cal/etc/f0cal/*.json"
//! provider = "f0cal"
//! counter_field = "perf_thread_cpu_clock"
//! latency_scale = 1e-6
//! cache_dir = "/var/cache/callscope"
//! ```
//!
//! Every key is optional.

use crate::error::{AnalysisError, Result};
use crate::stats::DEFAULT_LATENCY_SCALE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings for one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Glob selecting call-site manifest files
    #[serde(default = "default_manifest_glob")]
    pub manifest_glob: String,

    /// Keep only events of this provider (all providers when unset)
    pub provider: Option<String>,

    /// Per-thread context field used for call durations
    #[serde(default = "default_counter_field")]
    pub counter_field: String,

    /// Multiplier from counter units to milliseconds
    #[serde(default = "default_latency_scale")]
    pub latency_scale: f64,

    /// Root directory for the persistent table cache
    pub cache_dir: Option<PathBuf>,
}

fn default_manifest_glob() -> String {
    "manifests/*.json".to_string()
}

fn default_counter_field() -> String {
    "perf_thread_cpu_clock".to_string()
}

fn default_latency_scale() -> f64 {
    DEFAULT_LATENCY_SCALE
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            manifest_glob: default_manifest_glob(),
            provider: None,
            counter_field: default_counter_field(),
            latency_scale: default_latency_scale(),
            cache_dir: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    profiler: AnalysisConfig,
}

impl AnalysisConfig {
    /// Parse the `[profiler]` table of a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| AnalysisError::InvalidConfig(e.to_string()))?;
        file.profiler.validate()?;
        Ok(file.profiler)
    }

    /// Load and validate a TOML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.manifest_glob.trim().is_empty() {
            return Err(AnalysisError::InvalidConfig("manifest_glob must not be empty".to_string()));
        }
        if self.counter_field.trim().is_empty() {
            return Err(AnalysisError::InvalidConfig("counter_field must not be empty".to_string()));
        }
        if !self.latency_scale.is_finite() || self.latency_scale <= 0.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "latency_scale must be a positive number, got {}",
                self.latency_scale
            )));
        }
        Ok(())
    }
}
