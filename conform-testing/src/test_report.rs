//! Test reporting module
//!
//! Reporters are driven by the scheduler's single consuming loop, one call
//! at a time, so they own their sink outright and never lock it.

use std::io::Write;

use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use serde::Serialize;

use crate::error::Result;
use crate::test_discovery::{Outcome, TestCase};

const RULE_WIDTH: usize = 40;

/// Aggregate over every resolved case
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub passed: usize,
    pub total: usize,
    pub total_micros: u64,
}

impl RunSummary {
    pub fn record(&mut self, case: &TestCase) {
        self.total += 1;
        self.total_micros += case.elapsed_micros;
        if case.is_passed() {
            self.passed += 1;
        }
    }

    pub fn failed(&self) -> usize {
        self.total - self.passed
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }

    /// Mean subprocess time across all cases, in microseconds.
    pub fn mean_micros(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.total_micros as f64 / self.total as f64
        }
    }
}

/// Test reporter trait
pub trait Reporter {
    /// Called once with every case that will be scheduled
    fn on_run_start(&mut self, cases: &[TestCase]) -> Result<()>;

    /// Called once per resolved case
    fn on_case_finished(&mut self, case: &TestCase) -> Result<()>;

    /// Called after the failing case that ends an early-exit run; no summary follows
    fn on_early_exit(&mut self, case: &TestCase) -> Result<()>;

    /// Called when every case has been reported
    fn on_run_finished(&mut self, summary: &RunSummary) -> Result<()>;
}

/// Column-aligned console report
pub struct ConsoleReporter<W: Write> {
    out: W,
    color: bool,
    name_width: usize,
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            name_width: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, text: &str, style: fn(&str) -> ColoredString) -> String {
        if self.color {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn print_case_line(&mut self, case: &TestCase) -> Result<()> {
        let id = if case.is_passed() {
            self.paint(case.fingerprint.short(), |s| s.green())
        } else {
            self.paint(case.fingerprint.short(), |s| s.bright_red().bold())
        };
        writeln!(
            self.out,
            "{}  {:<width$}  {} us",
            id,
            case.display_name,
            case.elapsed_micros,
            width = self.name_width
        )?;
        Ok(())
    }

    fn print_failure_block(&mut self, case: &TestCase) -> Result<()> {
        let mut sections = vec![
            ("Expected", case.expected_output.as_str()),
            ("Output", case.actual_output.as_str()),
        ];
        if let (Some(expected), Some(actual)) = (&case.expected_stderr, &case.actual_stderr) {
            sections.push(("Expected Stderr", expected.as_str()));
            sections.push(("Stderr", actual.as_str()));
        }
        sections.push(("Test Case", case.source_text.as_str()));

        for (label, body) in sections {
            let header = format!("==== {label} ");
            let rule = format!("{header:=<RULE_WIDTH$}");
            let rule = self.paint(&rule, |s| s.bright_red());
            writeln!(self.out, "{rule}")?;
            writeln!(self.out, "{body}")?;
        }

        let closing = self.paint(&"=".repeat(RULE_WIDTH), |s| s.bright_red());
        writeln!(self.out, "{closing}")?;
        writeln!(self.out)?;
        Ok(())
    }

    fn banner(&self) -> String {
        let styles: [fn(&str) -> ColoredString; 7] = [
            |s| s.red(),
            |s| s.bright_red(),
            |s| s.yellow(),
            |s| s.green(),
            |s| s.cyan(),
            |s| s.blue(),
            |s| s.purple(),
        ];

        "CONGRATULATIONS"
            .chars()
            .enumerate()
            .map(|(i, c)| self.paint(&c.to_string(), styles[i % styles.len()]))
            .collect()
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn on_run_start(&mut self, cases: &[TestCase]) -> Result<()> {
        self.name_width = cases
            .iter()
            .map(|case| case.display_name.chars().count())
            .max()
            .unwrap_or(0);
        Ok(())
    }

    fn on_case_finished(&mut self, case: &TestCase) -> Result<()> {
        self.print_case_line(case)?;
        if !case.is_passed() {
            self.print_failure_block(case)?;
        }
        Ok(())
    }

    fn on_early_exit(&mut self, _case: &TestCase) -> Result<()> {
        writeln!(self.out, "Test failure caught. Exiting and reporting error.")?;
        self.out.flush()?;
        Ok(())
    }

    fn on_run_finished(&mut self, summary: &RunSummary) -> Result<()> {
        let tally = format!("{} passed out of {} cases", summary.passed, summary.total);
        let tally = self.paint(&tally, |s| s.yellow());
        let timing = format!("With an average time of {:4.0} us", summary.mean_micros());
        let timing = self.paint(&timing, |s| s.yellow());
        writeln!(self.out)?;
        writeln!(self.out, "{tally}")?;
        writeln!(self.out, "{timing}")?;

        if summary.all_passed() {
            let banner = self.banner();
            writeln!(self.out, "{banner}")?;
        }
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct JsonCase {
    id: String,
    name: String,
    path: String,
    outcome: Outcome,
    elapsed_micros: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    actual: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    actual_stderr: Option<String>,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    started_at: DateTime<Utc>,
    aborted: bool,
    cases: &'a [JsonCase],
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<JsonSummary>,
}

#[derive(Debug, Serialize)]
struct JsonSummary {
    passed: usize,
    failed: usize,
    total: usize,
    mean_micros: f64,
    success: bool,
}

/// One JSON document written when the run ends
pub struct JsonReporter<W: Write> {
    out: W,
    started_at: DateTime<Utc>,
    cases: Vec<JsonCase>,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            started_at: Utc::now(),
            cases: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_document(&mut self, aborted: bool, summary: Option<JsonSummary>) -> Result<()> {
        let report = JsonReport {
            started_at: self.started_at,
            aborted,
            cases: &self.cases,
            summary,
        };
        serde_json::to_writer_pretty(&mut self.out, &report).map_err(std::io::Error::from)?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn on_run_start(&mut self, cases: &[TestCase]) -> Result<()> {
        self.started_at = Utc::now();
        self.cases.reserve(cases.len());
        Ok(())
    }

    fn on_case_finished(&mut self, case: &TestCase) -> Result<()> {
        let failed = !case.is_passed();
        self.cases.push(JsonCase {
            id: case.fingerprint.short().to_string(),
            name: case.display_name.clone(),
            path: case.path.display().to_string(),
            outcome: case.outcome,
            elapsed_micros: case.elapsed_micros,
            expected: failed.then(|| case.expected_output.clone()),
            actual: failed.then(|| case.actual_output.clone()),
            expected_stderr: case.expected_stderr.clone().filter(|_| failed),
            actual_stderr: case.actual_stderr.clone().filter(|_| failed),
        });
        Ok(())
    }

    fn on_early_exit(&mut self, _case: &TestCase) -> Result<()> {
        self.write_document(true, None)
    }

    fn on_run_finished(&mut self, summary: &RunSummary) -> Result<()> {
        let summary = JsonSummary {
            passed: summary.passed,
            failed: summary.failed(),
            total: summary.total,
            mean_micros: summary.mean_micros(),
            success: summary.all_passed(),
        };
        self.write_document(false, Some(summary))
    }
}
