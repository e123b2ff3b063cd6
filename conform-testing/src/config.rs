//! Run configuration
//!
//! A single `RunConfig` is built at startup and handed to every component.
//! Nothing in the harness reads ambient global state.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Reserved marker for golden-output companion files.
pub const EXPECTATION_SUFFIX: &str = ".outp";

/// Marker for the optional expected-stderr companion.
pub const ERROR_SUFFIX: &str = ".error";

/// Fixture roots used when neither the config file nor the command line name any.
pub const DEFAULT_FIXTURE_DIRS: &[&str] = &[
    "testfiles/core/",
    "testfiles/variables/",
    "testfiles/expressions/",
    "testfiles/objects/",
    "testfiles/arrays/",
    "testfiles/booleans/",
    "testfiles/conditionals/",
];

/// How a non-zero exit from the binary under test is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitPolicy {
    /// Non-zero exit fails the case and prefixes a crash banner to its output.
    #[default]
    FatalCrash,
    /// Exit status is ignored; only captured text is compared.
    Transparent,
}

/// Which child streams make up the actual output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureMode {
    /// Standard output followed by standard error.
    #[default]
    Combined,
    StdoutOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleMode {
    Sequential,
    #[default]
    Concurrent,
}

/// Order in which resolved cases reach the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportOrder {
    /// Directory listing order.
    Discovery,
    /// Stable sort by display name.
    #[default]
    Name,
    /// First completed, first reported. Streams in concurrent mode.
    Arrival,
}

impl ReportOrder {
    /// Whether the concurrent scheduler has to hold results back until the run ends.
    pub fn is_buffered(self) -> bool {
        !matches!(self, ReportOrder::Arrival)
    }
}

impl FromStr for ExitPolicy {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fatal-crash" => Ok(ExitPolicy::FatalCrash),
            "transparent" => Ok(ExitPolicy::Transparent),
            _ => Err(invalid("exit policy", s, "fatal-crash, transparent")),
        }
    }
}

impl FromStr for CaptureMode {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "combined" => Ok(CaptureMode::Combined),
            "stdout-only" => Ok(CaptureMode::StdoutOnly),
            _ => Err(invalid("capture mode", s, "combined, stdout-only")),
        }
    }
}

impl FromStr for ScheduleMode {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sequential" => Ok(ScheduleMode::Sequential),
            "concurrent" => Ok(ScheduleMode::Concurrent),
            _ => Err(invalid("schedule mode", s, "sequential, concurrent")),
        }
    }
}

impl FromStr for ReportOrder {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "discovery" => Ok(ReportOrder::Discovery),
            "name" => Ok(ReportOrder::Name),
            "arrival" => Ok(ReportOrder::Arrival),
            _ => Err(invalid("report order", s, "discovery, name, arrival")),
        }
    }
}

fn invalid(setting: &'static str, value: &str, expected: &'static str) -> HarnessError {
    HarnessError::InvalidSetting {
        setting,
        value: value.to_string(),
        expected,
    }
}

/// Everything a run needs to know, fixed before the first fixture is read.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Binary under test, invoked as `<binary> <fixture-path>`.
    pub binary: PathBuf,

    /// Fixture roots, visited in this order.
    pub fixture_dirs: Vec<PathBuf>,

    /// Marker that identifies companion expectation files.
    pub expectation_suffix: String,

    /// Marker for expected-stderr companions, checked under stdout-only capture.
    pub error_suffix: String,

    pub exit_policy: ExitPolicy,

    pub capture: CaptureMode,

    pub schedule: ScheduleMode,

    /// Upper bound on concurrently running children. `None` is one task per fixture.
    pub jobs: Option<usize>,

    pub order: ReportOrder,

    /// Stop at the first failing case with a distinct exit code.
    pub early_exit: bool,

    /// Kill a child that runs longer than this.
    pub timeout: Option<Duration>,

    /// Case-insensitive substring matched against display name or path.
    pub filter: Option<String>,

    pub color: bool,
}

impl RunConfig {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            fixture_dirs: DEFAULT_FIXTURE_DIRS.iter().map(PathBuf::from).collect(),
            expectation_suffix: EXPECTATION_SUFFIX.to_string(),
            error_suffix: ERROR_SUFFIX.to_string(),
            exit_policy: ExitPolicy::default(),
            capture: CaptureMode::default(),
            schedule: ScheduleMode::default(),
            jobs: None,
            order: ReportOrder::default(),
            early_exit: false,
            timeout: None,
            filter: None,
            color: true,
        }
    }

    /// Startup checks that must hold before discovery begins.
    ///
    /// A bare program name (no path separator) is left to `PATH` lookup at
    /// spawn time.
    pub fn validate(&self) -> Result<()> {
        if names_a_path(&self.binary) && !self.binary.is_file() {
            return Err(HarnessError::MissingBinary(self.binary.clone()));
        }
        if self.jobs == Some(0) {
            return Err(invalid("job count", "0", "a positive integer"));
        }
        if self.expectation_suffix.is_empty() {
            return Err(invalid("expectation suffix", "", "a non-empty marker such as .outp"));
        }
        if self.error_suffix.is_empty() {
            return Err(invalid("error suffix", "", "a non-empty marker such as .error"));
        }
        if self.error_suffix == self.expectation_suffix {
            return Err(invalid(
                "error suffix",
                &self.error_suffix,
                "a marker different from the expectation suffix",
            ));
        }
        Ok(())
    }
}

fn names_a_path(binary: &Path) -> bool {
    binary.components().count() > 1 || binary.is_absolute()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::new("./parser");
        assert_eq!(config.exit_policy, ExitPolicy::FatalCrash);
        assert_eq!(config.capture, CaptureMode::Combined);
        assert_eq!(config.schedule, ScheduleMode::Concurrent);
        assert_eq!(config.order, ReportOrder::Name);
        assert_eq!(config.expectation_suffix, ".outp");
        assert_eq!(config.error_suffix, ".error");
        assert_eq!(config.fixture_dirs.len(), DEFAULT_FIXTURE_DIRS.len());
        assert!(config.jobs.is_none());
        assert!(config.timeout.is_none());
        assert!(!config.early_exit);
    }

    #[test]
    fn test_parse_settings() {
        assert_eq!("transparent".parse::<ExitPolicy>().unwrap(), ExitPolicy::Transparent);
        assert_eq!("stdout-only".parse::<CaptureMode>().unwrap(), CaptureMode::StdoutOnly);
        assert_eq!("sequential".parse::<ScheduleMode>().unwrap(), ScheduleMode::Sequential);
        assert_eq!("arrival".parse::<ReportOrder>().unwrap(), ReportOrder::Arrival);

        let err = "random".parse::<ReportOrder>().unwrap_err();
        assert!(err.to_string().contains("discovery, name, arrival"));
    }

    #[test]
    fn test_validate_missing_binary() {
        let config = RunConfig::new("/definitely/not/here/parser");
        assert!(matches!(config.validate(), Err(HarnessError::MissingBinary(_))));
    }

    #[test]
    fn test_validate_bare_program_name_deferred() {
        let config = RunConfig::new("some-parser-on-path");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_jobs() {
        let mut config = RunConfig::new("some-parser-on-path");
        config.jobs = Some(0);
        assert!(matches!(config.validate(), Err(HarnessError::InvalidSetting { .. })));
    }

    #[test]
    fn test_validate_suffixes_must_differ() {
        let mut config = RunConfig::new("some-parser-on-path");
        config.error_suffix = ".outp".to_string();
        assert!(matches!(config.validate(), Err(HarnessError::InvalidSetting { .. })));
    }
}
