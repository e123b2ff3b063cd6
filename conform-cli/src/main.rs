//! conform - golden-output conformance runner
//!
//! Feeds every fixture to the binary under test and compares what it prints
//! against the fixture's `.outp` companion.

use anyhow::{anyhow, Result};
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::run_command;
use config::{CliConfig, ReportFormat};
use conform_testing::config::ReportOrder;
use conform_testing::EXIT_STARTUP;

/// Run golden-output fixtures against a parser or interpreter binary
#[derive(Parser, Debug)]
#[command(name = "conform")]
#[command(about = "Golden-output conformance runner for parser binaries")]
#[command(version)]
pub struct Cli {
    /// Binary under test, invoked once per fixture as `<binary> <fixture>`
    pub binary: PathBuf,

    /// Stop at the first failing case
    #[arg(long)]
    pub exit_on_fail: bool,

    /// Fixture directory (repeatable, replaces the configured list)
    #[arg(short = 'd', long = "dir", value_name = "DIR")]
    pub dirs: Vec<PathBuf>,

    /// Run one fixture at a time
    #[arg(long)]
    pub sequential: bool,

    /// Upper bound on concurrently running children
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Report order (discovery, name, arrival)
    #[arg(long, value_name = "ORDER")]
    pub order: Option<ReportOrder>,

    /// Ignore the exit status and compare captured text only
    #[arg(long)]
    pub transparent: bool,

    /// Leave standard error out of the captured output
    #[arg(long)]
    pub stdout_only: bool,

    /// Kill a case that runs longer than this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Only run cases whose name or path contains this text
    #[arg(long, value_name = "TEXT")]
    pub filter: Option<String>,

    /// Report format
    #[arg(short, long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(EXIT_STARTUP);
    }

    let result = match CliConfig::load(cli.config.as_deref()) {
        Ok(config) => run_command(&cli, config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            debug!("run failed: {:?}", e);
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(EXIT_STARTUP);
        }
    }
}

/// Logs go to stderr so they never interleave with the report.
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {e}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_is_required() {
        assert!(Cli::try_parse_from(["conform"]).is_err());
    }

    #[test]
    fn test_extra_positional_is_rejected() {
        assert!(Cli::try_parse_from(["conform", "./parser", "./other"]).is_err());
    }

    #[test]
    fn test_flags_parse() {
        let cli = Cli::try_parse_from([
            "conform",
            "./parser",
            "--exit-on-fail",
            "-d",
            "a",
            "--dir",
            "b",
            "--jobs",
            "2",
            "--order",
            "arrival",
            "--timeout",
            "1.5",
            "--format",
            "json",
            "--no-color",
        ])
        .unwrap();

        assert_eq!(cli.binary, PathBuf::from("./parser"));
        assert!(cli.exit_on_fail);
        assert_eq!(cli.dirs, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(cli.jobs, Some(2));
        assert_eq!(cli.order, Some(ReportOrder::Arrival));
        assert_eq!(cli.timeout, Some(1.5));
        assert_eq!(cli.format, Some(ReportFormat::Json));
        assert!(cli.no_color);
        assert!(!cli.sequential);
    }

    #[test]
    fn test_unknown_order_is_rejected() {
        assert!(Cli::try_parse_from(["conform", "./parser", "--order", "random"]).is_err());
    }
}
