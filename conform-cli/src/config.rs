//! Configuration file handling
//!
//! Every key is optional. Values from the file sit underneath the
//! command-line flags.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use conform_testing::config::{
    CaptureMode, ExitPolicy, ReportOrder, ScheduleMode, DEFAULT_FIXTURE_DIRS, ERROR_SUFFIX,
    EXPECTATION_SUFFIX,
};

/// Looked up in the working directory before the user config dir.
pub const LOCAL_CONFIG_FILE: &str = "conform.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub fixtures: FixturesConfig,

    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub report: ReportSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FixturesConfig {
    /// Fixture directories, visited in order
    #[serde(default = "default_fixture_dirs")]
    pub dirs: Vec<PathBuf>,

    /// Marker naming the companion expectation file
    #[serde(default = "default_suffix")]
    pub suffix: String,

    /// Marker naming the expected-stderr companion
    #[serde(default = "default_error_suffix")]
    pub error_suffix: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunSection {
    #[serde(default)]
    pub exit_policy: ExitPolicy,

    #[serde(default)]
    pub capture: CaptureMode,

    #[serde(default)]
    pub schedule: ScheduleMode,

    #[serde(default)]
    pub jobs: Option<usize>,

    /// Per-case limit in seconds
    #[serde(default)]
    pub timeout: Option<f64>,

    #[serde(default)]
    pub early_exit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    #[serde(default)]
    pub order: ReportOrder,

    #[serde(default)]
    pub format: ReportFormat,

    #[serde(default = "default_true")]
    pub color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ReportFormat {
    #[default]
    Console,
    Json,
}

impl Default for FixturesConfig {
    fn default() -> Self {
        Self {
            dirs: default_fixture_dirs(),
            suffix: default_suffix(),
            error_suffix: default_error_suffix(),
        }
    }
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            order: ReportOrder::default(),
            format: ReportFormat::default(),
            color: default_true(),
        }
    }
}

impl CliConfig {
    /// Load the config file, or defaults when there is none.
    ///
    /// An explicit path must exist. Without one, `./conform.toml` is tried,
    /// then `conform/config.toml` under the user config directory.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) if !path.exists() => {
                bail!("Config file not found: {}", path.display())
            }
            Some(path) => path.to_owned(),
            None => match Self::discover_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: CliConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::debug!(path = %config_path.display(), "loaded config file");
        Ok(config)
    }

    fn discover_path() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }

        Self::default_config_path().filter(|path| path.is_file())
    }

    fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("conform").join("config.toml"))
    }
}

fn default_fixture_dirs() -> Vec<PathBuf> {
    DEFAULT_FIXTURE_DIRS.iter().map(PathBuf::from).collect()
}

fn default_suffix() -> String {
    EXPECTATION_SUFFIX.to_string()
}

fn default_error_suffix() -> String {
    ERROR_SUFFIX.to_string()
}

fn default_true() -> bool {
    true
}
