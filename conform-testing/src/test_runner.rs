//! Process runner
//!
//! Runs the binary under test once per fixture, captures what it prints,
//! times the call, and judges the outcome against the golden text.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{CaptureMode, ExitPolicy, RunConfig};
use crate::error::{HarnessError, Result};
use crate::test_compare::{compare, normalize};
use crate::test_discovery::{Outcome, TestCase};

/// Prefixed to the captured output of a crashed case.
pub const CRASH_BANNER: &str = "Your parser returned a non-zero exit code\n\
                                This generally means something very bad, like a segfault, happened\n\
                                The output is below\n\
                                ----------------------------------------\n";

/// Stands in for the output of a case that was killed for running too long.
pub fn timeout_banner(limit: Duration) -> String {
    format!(
        "Your parser did not finish within {:.1}s and was killed",
        limit.as_secs_f64()
    )
}

/// Spawns one child per case; holds no per-case state.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    binary: PathBuf,
    exit_policy: ExitPolicy,
    capture: CaptureMode,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            exit_policy: config.exit_policy,
            capture: config.capture,
            timeout: config.timeout,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Execute `case` and hand it back resolved.
    ///
    /// Elapsed time covers spawn through exit only. Dropping the returned
    /// future kills the child.
    pub async fn run(&self, mut case: TestCase) -> Result<TestCase> {
        let mut command = self.command_for(&case);

        let started = Instant::now();
        let child = command
            .spawn()
            .map_err(|source| self.process_error(&case, source))?;
        debug!(pid = ?child.id(), fixture = %case.path.display(), "spawned binary under test");

        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| limit),
            None => Ok(child.wait_with_output().await),
        };
        let elapsed_micros = started.elapsed().as_micros() as u64;

        let output = match waited {
            Ok(output) => output.map_err(|source| self.process_error(&case, source))?,
            Err(limit) => {
                warn!(fixture = %case.path.display(), ?limit, "binary under test timed out");
                case.resolve(Outcome::TimedOut, timeout_banner(limit), elapsed_micros);
                return Ok(case);
            }
        };

        let captured = self.captured_text(&output);
        let exited_cleanly = output.status.success();
        if !exited_cleanly {
            debug!(fixture = %case.path.display(), status = %output.status, "non-zero exit");
        }

        let (mut outcome, actual) = self.judge(&case.expected_output, exited_cleanly, &captured);

        // Under stdout-only capture an error companion is checked against stderr.
        let actual_stderr = match (self.capture, case.expected_stderr.as_deref()) {
            (CaptureMode::StdoutOnly, Some(expected)) => {
                let stderr = normalize(&String::from_utf8_lossy(&output.stderr));
                if outcome == Outcome::Passed && !compare(expected, &stderr) {
                    outcome = Outcome::Mismatch;
                }
                Some(stderr)
            }
            _ => None,
        };
        case.actual_stderr = actual_stderr;

        if outcome == Outcome::Crashed {
            warn!(fixture = %case.path.display(), status = %output.status, "binary under test crashed");
        }
        case.resolve(outcome, actual, elapsed_micros);

        Ok(case)
    }

    /// Decide the outcome and the normalized actual text for one finished run.
    pub fn judge(&self, expected: &str, exited_cleanly: bool, captured: &str) -> (Outcome, String) {
        if !exited_cleanly && self.exit_policy == ExitPolicy::FatalCrash {
            return (Outcome::Crashed, normalize(&format!("{CRASH_BANNER}{captured}")));
        }

        let actual = normalize(captured);
        let outcome = if compare(expected, &actual) {
            Outcome::Passed
        } else {
            Outcome::Mismatch
        };
        (outcome, actual)
    }

    fn command_for(&self, case: &TestCase) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg(&case.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true);

        let keep_stderr =
            self.capture == CaptureMode::Combined || case.expected_stderr.is_some();
        if keep_stderr {
            command.stderr(Stdio::piped());
        } else {
            command.stderr(Stdio::null());
        }

        command
    }

    fn captured_text(&self, output: &Output) -> String {
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if self.capture == CaptureMode::Combined {
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        text
    }

    fn process_error(&self, case: &TestCase, source: std::io::Error) -> HarnessError {
        HarnessError::Process {
            binary: self.binary.clone(),
            fixture: case.path.clone(),
            source,
        }
    }
}
