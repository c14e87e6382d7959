//! Problem log comparison

use regex::Regex;
use similar::TextDiff;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static PROBLEM_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A\d*\. ").unwrap());

static CAPTURE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"capture#\d+").unwrap());

const PROBLEM_SEPARATOR: &str = "----------\n";

/// `\r\n` and lone `\r` become `\n`
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// `capture#12-of ?` becomes `capture-of ?`
pub fn swallow_capture_ids(text: &str) -> String {
    CAPTURE_ID.replace_all(text, "capture").into_owned()
}

/// A problem log viewed as an unordered set of entries, problem numbers
/// stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemLog {
    entries: BTreeSet<String>,
}

impl ProblemLog {
    pub fn parse(log: &str) -> Self {
        let entries = log
            .split(PROBLEM_SEPARATOR)
            .filter(|entry| !entry.is_empty())
            .map(|entry| PROBLEM_NUMBER.replace(entry, "").into_owned())
            .collect();
        Self { entries }
    }

    pub fn same_as(&self, other: &str) -> bool {
        *self == ProblemLog::parse(other)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compares the compiler under test's log with one or more acceptable logs
#[derive(Debug, Clone, Default)]
pub struct LogMatcher {
    swallow_capture_ids: bool,
}

impl LogMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn swallow_capture_ids(mut self, swallow: bool) -> Self {
        self.swallow_capture_ids = swallow;
        self
    }

    fn prepare(&self, log: &str) -> String {
        let normalized = normalize_newlines(log);
        if self.swallow_capture_ids {
            swallow_capture_ids(&normalized)
        } else {
            normalized
        }
    }

    /// `Ok` when `actual` matches any of `expected`; otherwise a unified
    /// diff against the first one
    pub fn check(&self, expected: &[&str], actual: &str) -> Result<(), String> {
        let actual = self.prepare(actual);
        let computed = ProblemLog::parse(&actual);
        let prepared: Vec<String> = expected.iter().map(|log| self.prepare(log)).collect();
        if prepared
            .iter()
            .any(|log| *log == actual || computed.same_as(log))
        {
            return Ok(());
        }
        let first = prepared.first().map(String::as_str).unwrap_or_default();
        Err(render_diff(first, &actual))
    }
}

/// Unified diff, expected on the `-` side
pub fn render_diff(expected: &str, actual: &str) -> String {
    TextDiff::from_lines(expected, actual)
        .unified_diff()
        .context_radius(3)
        .header("expected", "actual")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PROBLEMS: &str = "----------\n\
        1. ERROR in X.java (at line 2)\n\
        \tZork z;\n\
        \t^^^^\n\
        Zork cannot be resolved to a type\n\
        ----------\n\
        2. WARNING in X.java (at line 4)\n\
        Dead code\n\
        ----------\n";

    #[test]
    fn test_newline_normalization_is_idempotent() {
        let crlf = TWO_PROBLEMS.replace('\n', "\r\n");
        let matcher = LogMatcher::new();
        assert!(matcher.check(&[TWO_PROBLEMS], &crlf).is_ok());
        assert!(matcher.check(&[&crlf], TWO_PROBLEMS).is_ok());
        assert_eq!(normalize_newlines(&normalize_newlines(&crlf)), TWO_PROBLEMS);
    }

    #[test]
    fn test_order_independent_comparison() {
        let swapped = "----------\n\
            1. WARNING in X.java (at line 4)\n\
            Dead code\n\
            ----------\n\
            2. ERROR in X.java (at line 2)\n\
            \tZork z;\n\
            \t^^^^\n\
            Zork cannot be resolved to a type\n\
            ----------\n";
        assert!(ProblemLog::parse(TWO_PROBLEMS).same_as(swapped));
        assert_eq!(ProblemLog::parse(TWO_PROBLEMS).len(), 2);
        assert!(ProblemLog::parse("").is_empty());
    }

    #[test]
    fn test_alternate_logs() {
        let matcher = LogMatcher::new();
        assert!(matcher.check(&["nope\n", TWO_PROBLEMS], TWO_PROBLEMS).is_ok());
        let diff = matcher.check(&["nope\n"], TWO_PROBLEMS).unwrap_err();
        assert!(diff.contains("-nope"));
        assert!(diff.contains("+Dead code"));
    }

    #[test]
    fn test_capture_ids_swallowed_on_request() {
        let expected = "----------\n1. ERROR in X.java (at line 1)\nType capture-of ? mismatch\n----------\n";
        let actual = "----------\n1. ERROR in X.java (at line 1)\nType capture#3-of ? mismatch\n----------\n";
        assert!(LogMatcher::new().check(&[expected], actual).is_err());
        assert!(LogMatcher::new()
            .swallow_capture_ids(true)
            .check(&[expected], actual)
            .is_ok());
    }

    #[test]
    fn test_empty_expected_log() {
        assert!(LogMatcher::new().check(&[""], "").is_ok());
        assert!(LogMatcher::new().check(&[""], TWO_PROBLEMS).is_err());
    }
}
