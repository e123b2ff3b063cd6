//! Fixture discovery
//!
//! This module scans fixture directories, pairs each fixture with its
//! optional golden-output companion, and produces `TestCase` records.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::config::{ReportOrder, RunConfig, ERROR_SUFFIX};
use crate::error::{HarnessError, Result};
use crate::fingerprint::Fingerprint;
use crate::test_compare::normalize;

/// Terminal state of a case. Every case leaves `Pending` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Pending,
    Passed,
    /// Ran cleanly but printed something other than the golden text.
    Mismatch,
    /// Non-zero exit (or killed by a signal) under the fatal-crash policy.
    Crashed,
    /// Killed after exceeding the configured timeout.
    TimedOut,
}

impl Outcome {
    pub fn is_passed(self) -> bool {
        matches!(self, Outcome::Passed)
    }

    pub fn is_resolved(self) -> bool {
        !matches!(self, Outcome::Pending)
    }
}

/// One fixture under test
#[derive(Debug, Clone)]
pub struct TestCase {
    /// Fixture source location; unique within a run
    pub path: PathBuf,

    /// Report label derived from the file name
    pub display_name: String,

    /// Short digest of the normalized source, for display only
    pub fingerprint: Fingerprint,

    /// Normalized fixture body
    pub source_text: String,

    /// Normalized golden text; empty when the fixture has no companion
    pub expected_output: String,

    /// Normalized expected stderr, when the fixture has an error companion
    pub expected_stderr: Option<String>,

    /// Normalized captured output, filled in by the runner
    pub actual_output: String,

    /// Normalized stderr, captured only when it is checked separately
    pub actual_stderr: Option<String>,

    /// Wall time of the subprocess call
    pub elapsed_micros: u64,

    pub outcome: Outcome,
}

impl TestCase {
    /// Build a pending case from raw fixture and companion text.
    pub fn new(path: PathBuf, source: &str, expected: &str) -> Self {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let source_text = normalize(source);
        let fingerprint = Fingerprint::of(&source_text);

        Self {
            display_name: display_name_for(&file_name),
            path,
            fingerprint,
            source_text,
            expected_output: normalize(expected),
            expected_stderr: None,
            actual_output: String::new(),
            actual_stderr: None,
            elapsed_micros: 0,
            outcome: Outcome::Pending,
        }
    }

    pub fn with_expected_stderr(mut self, expected: Option<&str>) -> Self {
        self.expected_stderr = expected.map(normalize);
        self
    }

    pub fn is_passed(&self) -> bool {
        self.outcome.is_passed()
    }

    /// Record the single execution result.
    pub fn resolve(&mut self, outcome: Outcome, actual_output: String, elapsed_micros: u64) {
        debug_assert!(
            !self.outcome.is_resolved(),
            "{} resolved twice",
            self.path.display()
        );
        debug_assert!(outcome.is_resolved());
        self.outcome = outcome;
        self.actual_output = actual_output;
        self.elapsed_micros = elapsed_micros;
    }
}

/// Turn `add-two-numbers` into `Add Two Numbers`.
///
/// Hyphens become spaces and every letter that follows a separator is
/// upper-cased; the rest of each word is left as written.
pub fn display_name_for(file_name: &str) -> String {
    let spaced = file_name.replace('-', " ");
    let mut pretty = String::with_capacity(spaced.len());
    let mut at_word_start = true;

    for c in spaced.chars() {
        if at_word_start {
            pretty.extend(c.to_uppercase());
        } else {
            pretty.push(c);
        }
        at_word_start = !(c.is_alphanumeric() || c == '_');
    }

    pretty
}

/// Stable sort by display name, so equal names keep listing order.
pub fn sort_by_display_name(cases: &mut [TestCase]) {
    cases.sort_by(|a, b| a.display_name.cmp(&b.display_name));
}

/// Keep cases whose display name or path contains `pattern`, ignoring case.
pub fn filter_cases(cases: Vec<TestCase>, pattern: &str) -> Vec<TestCase> {
    let needle = pattern.to_lowercase();
    cases
        .into_iter()
        .filter(|case| {
            case.display_name.to_lowercase().contains(&needle)
                || case.path.to_string_lossy().to_lowercase().contains(&needle)
        })
        .collect()
}

/// Discover, filter and order the cases for one run.
pub fn discover_cases(config: &RunConfig) -> Result<Vec<TestCase>> {
    let mut cases = FixtureStore::from_config(config).discover()?;

    if let Some(pattern) = &config.filter {
        let before = cases.len();
        cases = filter_cases(cases, pattern);
        debug!(pattern = %pattern, kept = cases.len(), before, "applied name filter");
    }

    if config.order == ReportOrder::Name {
        sort_by_display_name(&mut cases);
    }

    Ok(cases)
}

/// Fixture directories plus the companion naming rules
#[derive(Debug, Clone)]
pub struct FixtureStore {
    dirs: Vec<PathBuf>,
    suffix: String,
    error_suffix: String,
}

impl FixtureStore {
    pub fn new(dirs: Vec<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            dirs,
            suffix: suffix.into(),
            error_suffix: ERROR_SUFFIX.to_string(),
        }
    }

    pub fn with_error_suffix(mut self, error_suffix: impl Into<String>) -> Self {
        self.error_suffix = error_suffix.into();
        self
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.fixture_dirs.clone(), config.expectation_suffix.clone())
            .with_error_suffix(config.error_suffix.clone())
    }

    /// Discover every fixture in every directory, in listing order.
    ///
    /// Any unreadable directory or fixture aborts discovery.
    pub fn discover(&self) -> Result<Vec<TestCase>> {
        let mut cases = Vec::new();

        for dir in &self.dirs {
            self.discover_dir(dir, &mut cases)?;
        }

        debug!(count = cases.len(), "discovered fixtures");
        Ok(cases)
    }

    /// Files carrying either reserved marker are data, never tests.
    pub fn is_expectation_file(&self, file_name: &str) -> bool {
        file_name.contains(&self.suffix) || file_name.contains(&self.error_suffix)
    }

    /// Path of the golden companion for `fixture`.
    pub fn companion_path(&self, fixture: &Path) -> PathBuf {
        with_suffix(fixture, &self.suffix)
    }

    /// Path of the expected-stderr companion for `fixture`.
    pub fn error_companion_path(&self, fixture: &Path) -> PathBuf {
        with_suffix(fixture, &self.error_suffix)
    }

    /// Read one fixture and its companion into a pending case.
    pub fn load_case(&self, path: &Path) -> Result<TestCase> {
        let source = read_text(path)?.ok_or_else(|| HarnessError::FixtureFile {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "fixture vanished during discovery"),
        })?;

        // No companion means the fixture should produce no meaningful output.
        let expected = read_text(&self.companion_path(path))?.unwrap_or_default();
        let expected_stderr = read_text(&self.error_companion_path(path))?;

        Ok(TestCase::new(path.to_path_buf(), &source, &expected)
            .with_expected_stderr(expected_stderr.as_deref()))
    }

    fn discover_dir(&self, dir: &Path, cases: &mut Vec<TestCase>) -> Result<()> {
        let dir_error = |source: io::Error| HarnessError::FixtureDir {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = fs::read_dir(dir)
            .map_err(dir_error)?
            .collect::<io::Result<Vec<_>>>()
            .map_err(dir_error)?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().into_owned();

            if self.is_expectation_file(&file_name) {
                continue;
            }

            if !path.is_file() {
                debug!(path = %path.display(), "skipping non-file entry");
                continue;
            }

            let case = self.load_case(&path)?;
            debug!(
                path = %case.path.display(),
                id = %case.fingerprint,
                name = %case.display_name,
                "discovered fixture"
            );
            cases.push(case);
        }

        Ok(())
    }
}

fn with_suffix(fixture: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(fixture.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// `Ok(None)` when the file does not exist; any other failure is fatal.
fn read_text(path: &Path) -> Result<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(HarnessError::FixtureFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dirs: &[&Path]) -> FixtureStore {
        FixtureStore::new(dirs.iter().map(|d| d.to_path_buf()).collect(), ".outp")
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name_for("add-two-numbers"), "Add Two Numbers");
        assert_eq!(display_name_for("bad-syntax"), "Bad Syntax");
        assert_eq!(display_name_for("already Upper"), "Already Upper");
        assert_eq!(display_name_for("nested.objects"), "Nested.Objects");
        assert_eq!(display_name_for("snake_case-name"), "Snake_case Name");
        assert_eq!(display_name_for(""), "");
    }

    #[test]
    fn test_one_case_per_fixture() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("add-two-numbers"), "1 + 2\n").unwrap();
        fs::write(dir.join("add-two-numbers.outp"), "3\n").unwrap();
        fs::write(dir.join("empty-program"), "").unwrap();
        fs::write(dir.join("orphan.outp"), "never a test").unwrap();
        fs::create_dir(dir.join("nested")).unwrap();

        let cases = store(&[dir]).discover().unwrap();

        assert_eq!(cases.len(), 2);
        assert!(cases.iter().all(|c| !c.path.to_string_lossy().contains(".outp")));
        assert!(cases.iter().all(|c| c.outcome == Outcome::Pending));
    }

    #[test]
    fn test_companion_and_normalization() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("add-two-numbers"), "1\t+ 2\n").unwrap();
        fs::write(dir.join("add-two-numbers.outp"), "3\n").unwrap();

        let cases = store(&[dir]).discover().unwrap();
        let case = &cases[0];

        assert_eq!(case.display_name, "Add Two Numbers");
        assert_eq!(case.source_text, "1+ 2");
        assert_eq!(case.expected_output, "3");
        assert_eq!(case.fingerprint, Fingerprint::of("1+ 2"));
        assert!(case.actual_output.is_empty());
    }

    #[test]
    fn test_missing_companion_expects_empty() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("bad-syntax"), "(((").unwrap();

        let cases = store(&[temp_dir.path()]).discover().unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].expected_output, "");
    }

    #[test]
    fn test_listing_order_across_dirs() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        fs::write(first.path().join("zeta"), "z").unwrap();
        fs::write(first.path().join("alpha"), "a").unwrap();
        fs::write(second.path().join("beta"), "b").unwrap();

        let cases = store(&[first.path(), second.path()]).discover().unwrap();
        let names: Vec<_> = cases.iter().map(|c| c.display_name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Zeta", "Beta"]);

        let mut sorted = cases;
        sort_by_display_name(&mut sorted);
        let names: Vec<_> = sorted.iter().map(|c| c.display_name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta", "Zeta"]);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut cases = vec![
            TestCase::new(PathBuf::from("b/same-name"), "b", ""),
            TestCase::new(PathBuf::from("a/same-name"), "a", ""),
            TestCase::new(PathBuf::from("c/another"), "c", ""),
        ];
        sort_by_display_name(&mut cases);
        let paths: Vec<_> = cases.iter().map(|c| c.path.to_string_lossy().into_owned()).collect();
        assert_eq!(paths, vec!["c/another", "b/same-name", "a/same-name"]);
    }

    #[test]
    fn test_missing_dir_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("does-not-exist");

        let err = store(&[&missing]).discover().unwrap_err();
        assert!(matches!(err, HarnessError::FixtureDir { .. }));
    }

    #[test]
    fn test_filter_cases() {
        let cases = vec![
            TestCase::new(PathBuf::from("testfiles/arrays/push-pop"), "", ""),
            TestCase::new(PathBuf::from("testfiles/core/add-two-numbers"), "", ""),
        ];

        let kept = filter_cases(cases.clone(), "ADD");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].display_name, "Add Two Numbers");

        let kept = filter_cases(cases, "arrays/");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].display_name, "Push Pop");
    }

    #[test]
    fn test_companion_path() {
        let store = store(&[]);
        assert_eq!(
            store.companion_path(Path::new("testfiles/core/print")),
            PathBuf::from("testfiles/core/print.outp")
        );
        assert!(store.is_expectation_file("print.outp"));
        assert!(!store.is_expectation_file("print"));
    }

    #[test]
    fn test_error_companion_is_data_not_a_test() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("divide-by-zero"), "1 / 0").unwrap();
        fs::write(dir.join("divide-by-zero.error"), "division by zero\n").unwrap();
        fs::write(dir.join("add"), "1 + 2").unwrap();

        let cases = store(&[dir]).discover().unwrap();

        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].display_name, "Add");
        assert_eq!(cases[0].expected_stderr, None);
        assert_eq!(cases[1].display_name, "Divide By Zero");
        assert_eq!(cases[1].expected_stderr.as_deref(), Some("division by zero"));
        assert!(store(&[]).is_expectation_file("divide-by-zero.error"));
        assert_eq!(
            store(&[]).error_companion_path(Path::new("core/print")),
            PathBuf::from("core/print.error")
        );
    }

    #[test]
    fn test_custom_error_suffix() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("print"), "print 1").unwrap();
        fs::write(dir.join("print.stderr"), "warning").unwrap();

        let cases = store(&[dir]).with_error_suffix(".stderr").discover().unwrap();

        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].expected_stderr.as_deref(), Some("warning"));
    }

    #[test]
    fn test_unreadable_companion_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("print"), "print 1").unwrap();
        // A directory where the golden file should be cannot be read as text.
        fs::create_dir(dir.join("print.outp")).unwrap();

        let err = store(&[dir]).discover().unwrap_err();
        assert!(matches!(err, HarnessError::FixtureFile { ref path, .. } if path.ends_with("print.outp")));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_fixture_is_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let fixture = temp_dir.path().join("locked");
        fs::write(&fixture, "print 1").unwrap();
        fs::set_permissions(&fixture, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not bind a privileged user.
        if fs::read(&fixture).is_ok() {
            return;
        }

        let err = store(&[temp_dir.path()]).discover().unwrap_err();
        assert!(matches!(err, HarnessError::FixtureFile { ref path, .. } if path == &fixture));
    }
}
