//! Test scheduler
//!
//! Drives every case through the `ProcessRunner`. In concurrent mode each
//! case is its own task, and all results come back over one channel to the
//! loop that owns the reporter, so the report sink is only ever touched
//! from one place.

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::config::{ReportOrder, RunConfig, ScheduleMode};
use crate::error::{HarnessError, Result};
use crate::test_discovery::TestCase;
use crate::test_report::{Reporter, RunSummary};
use crate::test_runner::ProcessRunner;

pub const EXIT_SUCCESS: i32 = 0;
/// A full run finished with at least one failing case.
pub const EXIT_FAILED: i32 = 1;
/// The test universe could not be established.
pub const EXIT_STARTUP: i32 = 2;
/// Early-exit mode stopped the run at a failing case.
pub const EXIT_EARLY: i32 = 3;

/// What a finished (or aborted) run produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunReport {
    /// Tally over the cases that reached the reporter
    pub summary: RunSummary,

    /// Cases that delivered a result, reported or not
    pub delivered: usize,

    /// Early exit fired
    pub aborted: bool,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        if self.aborted {
            EXIT_EARLY
        } else if self.summary.all_passed() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILED
        }
    }
}

/// Reporting state owned by the consuming loop.
struct Aggregator<'r> {
    reporter: &'r mut dyn Reporter,
    summary: RunSummary,
    early_exit: bool,
}

impl Aggregator<'_> {
    /// Report one case. `false` means the run has to stop here.
    fn deliver(&mut self, case: &TestCase) -> Result<bool> {
        self.summary.record(case);
        self.reporter.on_case_finished(case)?;

        if self.early_exit && !case.is_passed() {
            info!(fixture = %case.path.display(), "stopping at first failure");
            self.reporter.on_early_exit(case)?;
            return Ok(false);
        }
        Ok(true)
    }
}

pub struct Scheduler {
    runner: Arc<ProcessRunner>,
    schedule: ScheduleMode,
    jobs: Option<usize>,
    order: ReportOrder,
    early_exit: bool,
}

impl Scheduler {
    pub fn new(runner: ProcessRunner, config: &RunConfig) -> Self {
        Self {
            runner: Arc::new(runner),
            schedule: config.schedule,
            jobs: config.jobs,
            order: config.order,
            early_exit: config.early_exit,
        }
    }

    /// Run every case exactly once and report it.
    ///
    /// Cases are reported in the order given, except in concurrent mode with
    /// `ReportOrder::Arrival`, where they stream as they complete.
    pub async fn run(&self, cases: Vec<TestCase>, reporter: &mut dyn Reporter) -> Result<RunReport> {
        info!(
            cases = cases.len(),
            schedule = ?self.schedule,
            jobs = ?self.jobs,
            order = ?self.order,
            binary = %self.runner.binary().display(),
            "starting run"
        );

        reporter.on_run_start(&cases)?;
        let mut aggregator = Aggregator {
            reporter,
            summary: RunSummary::default(),
            early_exit: self.early_exit,
        };

        let (delivered, aborted) = match self.schedule {
            ScheduleMode::Sequential => self.run_sequential(cases, &mut aggregator).await?,
            ScheduleMode::Concurrent => self.run_concurrent(cases, &mut aggregator).await?,
        };

        let summary = aggregator.summary;
        if !aborted {
            aggregator.reporter.on_run_finished(&summary)?;
        }

        info!(
            passed = summary.passed,
            total = summary.total,
            delivered,
            aborted,
            "run finished"
        );
        Ok(RunReport {
            summary,
            delivered,
            aborted,
        })
    }

    async fn run_sequential(
        &self,
        cases: Vec<TestCase>,
        aggregator: &mut Aggregator<'_>,
    ) -> Result<(usize, bool)> {
        let mut delivered = 0;

        for case in cases {
            let case = self.runner.run(case).await?;
            delivered += 1;
            if !aggregator.deliver(&case)? {
                return Ok((delivered, true));
            }
        }

        Ok((delivered, false))
    }

    async fn run_concurrent(
        &self,
        cases: Vec<TestCase>,
        aggregator: &mut Aggregator<'_>,
    ) -> Result<(usize, bool)> {
        let dispatched = cases.len();
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, Result<TestCase>)>();
        let limiter = self.jobs.map(|jobs| Arc::new(Semaphore::new(jobs)));
        let mut workers = JoinSet::new();

        for (index, case) in cases.into_iter().enumerate() {
            let runner = Arc::clone(&self.runner);
            let limiter = limiter.clone();
            let tx = tx.clone();

            workers.spawn(async move {
                let _permit = match limiter {
                    Some(limiter) => limiter.acquire_owned().await.ok(),
                    None => None,
                };
                let result = runner.run(case).await;
                // The receiver is only gone once the run has been cut short.
                let _ = tx.send((index, result));
            });
        }
        drop(tx);
        debug!(dispatched, "dispatched workers");

        let buffered = self.order.is_buffered();
        let progress = buffered.then(|| progress_bar(dispatched));
        let mut slots: Vec<Option<TestCase>> = Vec::new();
        if buffered {
            slots.resize_with(dispatched, || None);
        }

        let mut outstanding = dispatched;
        let mut aborted = false;
        // slots[..ready] are all filled and passed.
        let mut ready = 0;

        while outstanding > 0 {
            let Some((index, result)) = rx.recv().await else {
                break;
            };
            outstanding -= 1;

            let case = match result {
                Ok(case) => case,
                Err(err) => {
                    cancel(&mut workers).await;
                    return Err(err);
                }
            };

            if buffered {
                slots[index] = Some(case);
                if let Some(progress) = &progress {
                    progress.inc(1);
                }
                // Stop only at the first failure in report order, once every
                // case ahead of it has resolved.
                if self.early_exit && first_failure_ready(&slots, &mut ready) {
                    aborted = true;
                    break;
                }
            } else if !aggregator.deliver(&case)? {
                aborted = true;
                break;
            }
        }

        if let Some(progress) = &progress {
            progress.finish_and_clear();
        }

        let delivered = dispatched - outstanding;
        if aborted {
            cancel(&mut workers).await;
        } else if outstanding > 0 {
            while let Some(joined) = workers.join_next().await {
                joined.map_err(|err| HarnessError::Worker(err.to_string()))?;
            }
            return Err(HarnessError::Worker(format!(
                "{outstanding} of {dispatched} cases never delivered a result"
            )));
        }

        for case in slots.into_iter().flatten() {
            if !aggregator.deliver(&case)? {
                aborted = true;
                break;
            }
        }

        Ok((delivered, aborted))
    }
}

/// Advance `ready` over the filled prefix of `slots`; `true` when that prefix
/// reaches a failing case.
fn first_failure_ready(slots: &[Option<TestCase>], ready: &mut usize) -> bool {
    while let Some(Some(case)) = slots.get(*ready) {
        if !case.is_passed() {
            return true;
        }
        *ready += 1;
    }
    false
}

/// Abort every worker and wait until each future is dropped, which kills its child.
async fn cancel(workers: &mut JoinSet<()>) {
    workers.abort_all();
    while workers.join_next().await.is_some() {}
}

/// Drawn on stderr while results are held back; hidden when stderr is not a terminal.
fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(len as u64), ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_discovery::Outcome;
    use std::path::PathBuf;

    fn summary(passed: usize, total: usize) -> RunSummary {
        RunSummary {
            passed,
            total,
            total_micros: 0,
        }
    }

    #[test]
    fn test_exit_codes() {
        let report = |passed, total, aborted| RunReport {
            summary: summary(passed, total),
            delivered: total,
            aborted,
        };

        assert_eq!(report(5, 5, false).exit_code(), EXIT_SUCCESS);
        assert_eq!(report(4, 5, false).exit_code(), EXIT_FAILED);
        assert_eq!(report(2, 3, true).exit_code(), EXIT_EARLY);
        assert_eq!(report(0, 0, false).exit_code(), EXIT_SUCCESS);
    }

    fn case(name: &str, outcome: Outcome) -> Option<TestCase> {
        let mut case = TestCase::new(PathBuf::from(name), "", "");
        case.resolve(outcome, String::new(), 1);
        Some(case)
    }

    #[test]
    fn test_first_failure_waits_for_earlier_slots() {
        let mut ready = 0;
        let mut slots = vec![None, case("b", Outcome::Passed), case("c", Outcome::Mismatch)];

        // A later failure is not final while an earlier case is still running.
        assert!(!first_failure_ready(&slots, &mut ready));
        assert_eq!(ready, 0);

        slots[0] = case("a", Outcome::Passed);
        assert!(first_failure_ready(&slots, &mut ready));
        assert_eq!(ready, 2);
    }

    #[test]
    fn test_first_failure_in_order_wins() {
        let mut ready = 0;
        let slots = vec![case("a", Outcome::Crashed), case("b", Outcome::Mismatch)];

        assert!(first_failure_ready(&slots, &mut ready));
        assert_eq!(ready, 0);
    }
}
