//! Golden-output conformance harness for an external parser/interpreter binary
//!
//! Fixtures are discovered on disk, each one is fed to the binary under test in
//! its own process, and the captured output is compared against a companion
//! `.outp` file. Results flow back through a single consumer that owns the
//! report sink.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod test_compare;
pub mod test_discovery;
pub mod test_report;
pub mod test_runner;
pub mod test_scheduler;

pub use config::{CaptureMode, ExitPolicy, ReportOrder, RunConfig, ScheduleMode};
pub use error::{HarnessError, Result};
pub use fingerprint::Fingerprint;
pub use test_compare::{compare, normalize};
pub use test_discovery::{discover_cases, FixtureStore, Outcome, TestCase};
pub use test_report::{ConsoleReporter, JsonReporter, Reporter, RunSummary};
pub use test_runner::ProcessRunner;
pub use test_scheduler::{RunReport, Scheduler, EXIT_EARLY, EXIT_FAILED, EXIT_STARTUP, EXIT_SUCCESS};
