//! Error taxonomy for the harness
//!
//! Everything here is fatal to a run. Per-case problems (non-zero exit,
//! mismatched output, timeouts) are outcomes on the `TestCase`, not errors.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to read fixture directory {}: {source}", .path.display())]
    FixtureDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read fixture {}: {source}", .path.display())]
    FixtureFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("binary under test not found: {}", .0.display())]
    MissingBinary(PathBuf),

    #[error("failed to run {} on {}: {source}", .binary.display(), .fixture.display())]
    Process {
        binary: PathBuf,
        fixture: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write report: {0}")]
    Report(#[from] io::Error),

    #[error("invalid {setting} '{value}' (expected one of: {expected})")]
    InvalidSetting {
        setting: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("worker failed before delivering a result: {0}")]
    Worker(String),
}
