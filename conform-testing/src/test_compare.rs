//! Output normalization and comparison
//!
//! Tabs are reserved as the report's column separator, so they never take
//! part in a comparison. Trailing newlines are noise from `println`-style
//! output. Beyond that, equality is exact: any leniency belongs in the
//! fixture, not here.

/// Drop every tab, then strip trailing newlines.
pub fn normalize(text: &str) -> String {
    let without_tabs: String = text.chars().filter(|c| *c != '\t').collect();
    without_tabs.trim_end_matches('\n').to_string()
}

/// `true` when both sides are identical after normalization.
pub fn compare(expected: &str, actual: &str) -> bool {
    normalize(expected) == normalize(actual)
}
