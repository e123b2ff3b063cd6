//! Run command implementation
//!
//! Merges the command line over the config file, establishes the test
//! universe, and hands it to the scheduler.

use anyhow::{Context, Result};
use std::io;
use std::time::Duration;
use tracing::info;

use conform_testing::{
    discover_cases, CaptureMode, ConsoleReporter, ExitPolicy, JsonReporter, ProcessRunner,
    Reporter, RunConfig, ScheduleMode, Scheduler,
};

use crate::config::{CliConfig, ReportFormat};
use crate::Cli;

/// Run every fixture and return the process exit code.
pub async fn run_command(cli: &Cli, config: CliConfig) -> Result<i32> {
    let format = cli.format.unwrap_or(config.report.format);
    let run_config = build_run_config(cli, config)?;

    if !run_config.color {
        colored::control::set_override(false);
    }

    run_config
        .validate()
        .context("Invalid run configuration")?;

    let cases = discover_cases(&run_config).context("Failed to discover fixtures")?;
    info!(
        cases = cases.len(),
        dirs = run_config.fixture_dirs.len(),
        "discovered fixtures"
    );

    let scheduler = Scheduler::new(ProcessRunner::new(&run_config), &run_config);
    let mut reporter: Box<dyn Reporter> = match format {
        ReportFormat::Console => Box::new(ConsoleReporter::new(io::stdout().lock(), run_config.color)),
        ReportFormat::Json => Box::new(JsonReporter::new(io::stdout().lock())),
    };

    let report = scheduler
        .run(cases, reporter.as_mut())
        .await
        .context("Run aborted")?;

    Ok(report.exit_code())
}

/// Command-line flags win over file values; the file wins over defaults.
pub fn build_run_config(cli: &Cli, config: CliConfig) -> Result<RunConfig> {
    let CliConfig {
        fixtures,
        run,
        report,
    } = config;

    let mut run_config = RunConfig::new(&cli.binary);

    run_config.fixture_dirs = if cli.dirs.is_empty() {
        fixtures.dirs
    } else {
        cli.dirs.clone()
    };
    run_config.expectation_suffix = fixtures.suffix;
    run_config.error_suffix = fixtures.error_suffix;

    run_config.exit_policy = if cli.transparent {
        ExitPolicy::Transparent
    } else {
        run.exit_policy
    };
    run_config.capture = if cli.stdout_only {
        CaptureMode::StdoutOnly
    } else {
        run.capture
    };
    run_config.schedule = if cli.sequential {
        ScheduleMode::Sequential
    } else {
        run.schedule
    };

    run_config.jobs = cli.jobs.or(run.jobs);
    run_config.order = cli.order.unwrap_or(report.order);
    run_config.early_exit = cli.exit_on_fail || run.early_exit;
    run_config.filter = cli.filter.clone();
    run_config.color = report.color && !cli.no_color;

    if let Some(secs) = cli.timeout.or(run.timeout) {
        let limit = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("Invalid timeout: {secs} seconds"))?;
        run_config.timeout = Some(limit);
    }

    Ok(run_config)
}
