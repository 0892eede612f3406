//! TOML configuration for the external tools the pipeline drives.
//!
//! Tool locations, timeouts and the decoy-prefix pattern live in a config
//! file rather than in code:
//!
//! ```toml
//! # rescore.toml
//! [msgf]
//! dir = "/opt/MSGFPlus"
//! heap_mb = 8000
//! precursor_tolerance = "10ppm"
//! timeout_secs = 7200
//!
//! [converter]
//! path = "msgf2pin"
//! decoy_pattern = "XXX"
//!
//! [ms2pip]
//! dir = "/opt/ms2pip_c"
//!
//! [features]
//! command = ["python", "/opt/rescore/calc_features.py"]
//!
//! [percolator]
//! path = "percolator"
//! ```
//!
//! Every section and field is optional; the defaults below apply.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Root configuration structure for rescore.toml files.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// MSGF+ search engine settings.
    #[serde(default)]
    pub msgf: MsgfConfig,

    /// mzid-to-PIN converter settings.
    #[serde(default)]
    pub converter: ConverterConfig,

    /// MS2PIP spectrum predictor settings.
    #[serde(default)]
    pub ms2pip: Ms2pipConfig,

    /// Feature calculation command (external to the pipeline core).
    #[serde(default)]
    pub features: FeaturesConfig,

    /// Percolator re-scorer settings.
    #[serde(default)]
    pub percolator: PercolatorConfig,
}

/// Settings for the MSGF+ invocation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MsgfConfig {
    /// Directory containing MSGFPlus.jar.
    #[serde(default = "default_msgf_dir")]
    pub dir: PathBuf,

    /// JVM heap size in megabytes.
    #[serde(default = "default_heap_mb")]
    pub heap_mb: u32,

    /// Precursor mass tolerance passed as `-t`.
    #[serde(default = "default_precursor_tolerance")]
    pub precursor_tolerance: String,

    /// Wall-clock limit for the search.
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

/// Settings for the msgf2pin converter.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConverterConfig {
    /// Converter executable.
    #[serde(default = "default_converter_path")]
    pub path: String,

    /// Decoy protein prefix passed as `-P`; MSGF+ uses `XXX`.
    #[serde(default = "default_decoy_pattern")]
    pub decoy_pattern: String,

    /// Wall-clock limit for the conversion.
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

/// Settings for the MS2PIP invocation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Ms2pipConfig {
    /// Directory containing ms2pipC.py.
    #[serde(default = "default_ms2pip_dir")]
    pub dir: PathBuf,

    /// Python interpreter used to run it.
    #[serde(default = "default_python")]
    pub python: String,

    /// MS2PIP config file; defaults to `config.file` inside `dir`.
    #[serde(default)]
    pub config: Option<PathBuf>,

    /// Wall-clock limit for the prediction run.
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

/// Settings for the external feature calculation step.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeaturesConfig {
    /// Command prefix invoked as
    /// `<command...> <pred_and_emp.csv> <features.csv>`. Empty means the
    /// pipeline cannot run the feature step and `run` will refuse to start.
    #[serde(default)]
    pub command: Vec<String>,

    /// Wall-clock limit for the feature calculation.
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

/// Settings for the Percolator invocation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PercolatorConfig {
    /// Percolator executable.
    #[serde(default = "default_percolator_path")]
    pub path: String,

    /// Wall-clock limit per subset run.
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }
}

impl Ms2pipConfig {
    /// Resolved MS2PIP config file path.
    pub fn config_file(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.dir.join("config.file"))
    }

    /// Wall-clock limit as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl MsgfConfig {
    /// Wall-clock limit as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ConverterConfig {
    /// Wall-clock limit as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl FeaturesConfig {
    /// Wall-clock limit as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PercolatorConfig {
    /// Wall-clock limit as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for MsgfConfig {
    fn default() -> Self {
        Self {
            dir: default_msgf_dir(),
            heap_mb: default_heap_mb(),
            precursor_tolerance: default_precursor_tolerance(),
            timeout_secs: default_search_timeout(),
        }
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            path: default_converter_path(),
            decoy_pattern: default_decoy_pattern(),
            timeout_secs: default_tool_timeout(),
        }
    }
}

impl Default for Ms2pipConfig {
    fn default() -> Self {
        Self {
            dir: default_ms2pip_dir(),
            python: default_python(),
            config: None,
            timeout_secs: default_search_timeout(),
        }
    }
}

impl Default for PercolatorConfig {
    fn default() -> Self {
        Self {
            path: default_percolator_path(),
            timeout_secs: default_tool_timeout(),
        }
    }
}

fn default_msgf_dir() -> PathBuf {
    PathBuf::from("/opt/MSGFPlus")
}

fn default_heap_mb() -> u32 {
    8000
}

fn default_precursor_tolerance() -> String {
    "10ppm".to_string()
}

fn default_search_timeout() -> u64 {
    7200
}

fn default_tool_timeout() -> u64 {
    3600
}

fn default_converter_path() -> String {
    "msgf2pin".to_string()
}

fn default_decoy_pattern() -> String {
    "XXX".to_string()
}

fn default_ms2pip_dir() -> PathBuf {
    PathBuf::from("ms2pip_c")
}

fn default_python() -> String {
    "python".to_string()
}

fn default_percolator_path() -> String {
    "percolator".to_string()
}
