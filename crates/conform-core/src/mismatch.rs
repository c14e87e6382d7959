//! Classification of disagreements between the compiler under test and a
//! reference installation
//!
//! Two independent axes are classified. The diagnostics axis looks only at
//! what the test expected of the compiler under test and how the reference
//! compiler exited. The runtime axis compares captured program output and is
//! only consulted when neither side reported errors.

use crate::reference::{CompileOutcome, RuntimeOutcome};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix a dying runtime puts in front of an uncaught exception; the
/// in-process verifier prints stack traces without it.
const UNCAUGHT_EXCEPTION_PREFIX: &str = "Exception in thread \"main\" ";

/// Messages a reference runtime emits when the entry point has no `main`.
/// Such output is accepted only where an empty stderr was expected.
const MISSING_ENTRY_POINT_MESSAGES: &[&str] = &[
    "java.lang.NoSuchMethodError: main",
    "Error: Main method not found in class",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MismatchKind {
    UnderTestErrorsReferenceNone,
    UnderTestErrorsReferenceWarnings,
    ReferenceErrorsUnderTestNone,
    ReferenceErrorsUnderTestWarnings,
    UnderTestWarningsReferenceNone,
    ReferenceWarningsUnderTestNone,
    StdoutMismatch,
    StderrMismatch,
    ReferenceCompileAborted,
    ReferenceCompileUnlaunchable,
    ReferenceRunAborted,
    ReferenceRunUnlaunchable,
}

impl MismatchKind {
    pub const ALL: [MismatchKind; 12] = [
        MismatchKind::UnderTestErrorsReferenceNone,
        MismatchKind::UnderTestErrorsReferenceWarnings,
        MismatchKind::ReferenceErrorsUnderTestNone,
        MismatchKind::ReferenceErrorsUnderTestWarnings,
        MismatchKind::UnderTestWarningsReferenceNone,
        MismatchKind::ReferenceWarningsUnderTestNone,
        MismatchKind::StdoutMismatch,
        MismatchKind::StderrMismatch,
        MismatchKind::ReferenceCompileAborted,
        MismatchKind::ReferenceCompileUnlaunchable,
        MismatchKind::ReferenceRunAborted,
        MismatchKind::ReferenceRunUnlaunchable,
    ];

    fn bit(self) -> u16 {
        1 << (self as u16)
    }

    pub fn name(self) -> &'static str {
        match self {
            MismatchKind::UnderTestErrorsReferenceNone => "UnderTestErrorsReferenceNone",
            MismatchKind::UnderTestErrorsReferenceWarnings => "UnderTestErrorsReferenceWarnings",
            MismatchKind::ReferenceErrorsUnderTestNone => "ReferenceErrorsUnderTestNone",
            MismatchKind::ReferenceErrorsUnderTestWarnings => "ReferenceErrorsUnderTestWarnings",
            MismatchKind::UnderTestWarningsReferenceNone => "UnderTestWarningsReferenceNone",
            MismatchKind::ReferenceWarningsUnderTestNone => "ReferenceWarningsUnderTestNone",
            MismatchKind::StdoutMismatch => "StdoutMismatch",
            MismatchKind::StderrMismatch => "StderrMismatch",
            MismatchKind::ReferenceCompileAborted => "ReferenceCompileAborted",
            MismatchKind::ReferenceCompileUnlaunchable => "ReferenceCompileUnlaunchable",
            MismatchKind::ReferenceRunAborted => "ReferenceRunAborted",
            MismatchKind::ReferenceRunUnlaunchable => "ReferenceRunUnlaunchable",
        }
    }

    /// One-line description used in failure messages
    pub fn describe(self) -> &'static str {
        match self {
            MismatchKind::UnderTestErrorsReferenceNone => {
                "compiler under test found error(s) but the reference compiler did not find any"
            }
            MismatchKind::UnderTestErrorsReferenceWarnings => {
                "compiler under test found error(s) but the reference compiler only found warning(s)"
            }
            MismatchKind::ReferenceErrorsUnderTestNone => {
                "reference compiler found error(s) but the compiler under test did not find any"
            }
            MismatchKind::ReferenceErrorsUnderTestWarnings => {
                "reference compiler found error(s) but the compiler under test only found warning(s)"
            }
            MismatchKind::UnderTestWarningsReferenceNone => {
                "compiler under test found warning(s) but the reference compiler did not find any"
            }
            MismatchKind::ReferenceWarningsUnderTestNone => {
                "reference compiler found warning(s) but the compiler under test did not find any"
            }
            MismatchKind::StdoutMismatch => "standard output mismatch",
            MismatchKind::StderrMismatch => "standard error mismatch",
            MismatchKind::ReferenceCompileAborted => "reference compiler was aborted",
            MismatchKind::ReferenceCompileUnlaunchable => "reference compiler could not be launched",
            MismatchKind::ReferenceRunAborted => "reference runtime was aborted",
            MismatchKind::ReferenceRunUnlaunchable => "reference runtime could not be launched",
        }
    }

    /// Infrastructure kinds mean the comparison itself could not be made
    pub fn is_infrastructure(self) -> bool {
        MismatchSet::INFRASTRUCTURE.contains(self)
    }
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MismatchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MismatchKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown mismatch kind: {s}"))
    }
}

/// A set of [`MismatchKind`]s
///
/// The empty set is meaningful to excuses: it clears anything.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MismatchSet(u16);

impl MismatchSet {
    pub const EMPTY: MismatchSet = MismatchSet(0);

    pub const REFERENCE_FOUND_MORE: MismatchSet = MismatchSet::of_kinds(&[
        MismatchKind::ReferenceErrorsUnderTestNone,
        MismatchKind::ReferenceErrorsUnderTestWarnings,
        MismatchKind::ReferenceWarningsUnderTestNone,
    ]);

    pub const UNDER_TEST_FOUND_MORE: MismatchSet = MismatchSet::of_kinds(&[
        MismatchKind::UnderTestErrorsReferenceNone,
        MismatchKind::UnderTestErrorsReferenceWarnings,
        MismatchKind::UnderTestWarningsReferenceNone,
    ]);

    pub const OUTPUT_DIFFERS: MismatchSet =
        MismatchSet::of_kinds(&[MismatchKind::StdoutMismatch, MismatchKind::StderrMismatch]);

    pub const INFRASTRUCTURE: MismatchSet = MismatchSet::of_kinds(&[
        MismatchKind::ReferenceCompileAborted,
        MismatchKind::ReferenceCompileUnlaunchable,
        MismatchKind::ReferenceRunAborted,
        MismatchKind::ReferenceRunUnlaunchable,
    ]);

    pub const fn of_kinds(kinds: &[MismatchKind]) -> MismatchSet {
        let mut bits = 0u16;
        let mut i = 0;
        while i < kinds.len() {
            bits |= 1 << (kinds[i] as u16);
            i += 1;
        }
        MismatchSet(bits)
    }

    pub fn with(self, kind: MismatchKind) -> MismatchSet {
        MismatchSet(self.0 | kind.bit())
    }

    pub fn union(self, other: MismatchSet) -> MismatchSet {
        MismatchSet(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, kind: MismatchKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = MismatchKind> {
        MismatchKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl From<MismatchKind> for MismatchSet {
    fn from(kind: MismatchKind) -> Self {
        MismatchSet(kind.bit())
    }
}

impl FromIterator<MismatchKind> for MismatchSet {
    fn from_iter<I: IntoIterator<Item = MismatchKind>>(iter: I) -> Self {
        iter.into_iter().fold(MismatchSet::EMPTY, MismatchSet::with)
    }
}

impl fmt::Debug for MismatchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for MismatchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(any)");
        }
        let names: Vec<&str> = self.iter().map(MismatchKind::name).collect();
        f.write_str(&names.join(" | "))
    }
}

impl Serialize for MismatchSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for MismatchSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kinds = Vec::<MismatchKind>::deserialize(deserializer)?;
        Ok(kinds.into_iter().collect())
    }
}

/// What a test expects of the compiler under test's diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedDiagnostics {
    /// Error-level problems
    Errors,
    /// A non-empty log without errors
    Warnings,
    /// An explicitly empty log
    Clean,
    /// No expected log given; warning differences are not checked
    Unchecked,
}

impl ExpectedDiagnostics {
    pub fn new(expect_errors: bool, expected_log: Option<&str>) -> Self {
        match (expect_errors, expected_log) {
            (true, _) => ExpectedDiagnostics::Errors,
            (false, None) => ExpectedDiagnostics::Unchecked,
            (false, Some("")) => ExpectedDiagnostics::Clean,
            (false, Some(_)) => ExpectedDiagnostics::Warnings,
        }
    }
}

/// Diagnostics axis
///
/// A pure function of the expectation, the reference exit code and whether
/// the reference wrote anything to stderr.
pub fn classify_diagnostics(
    expected: ExpectedDiagnostics,
    reference: &CompileOutcome,
) -> Option<MismatchKind> {
    let failed = reference.failed();
    let has_log = reference.has_error_log();
    match expected {
        ExpectedDiagnostics::Errors if failed => None,
        ExpectedDiagnostics::Errors if has_log => Some(MismatchKind::UnderTestErrorsReferenceWarnings),
        ExpectedDiagnostics::Errors => Some(MismatchKind::UnderTestErrorsReferenceNone),
        ExpectedDiagnostics::Warnings if failed => {
            Some(MismatchKind::ReferenceErrorsUnderTestWarnings)
        }
        ExpectedDiagnostics::Clean | ExpectedDiagnostics::Unchecked if failed => {
            Some(MismatchKind::ReferenceErrorsUnderTestNone)
        }
        ExpectedDiagnostics::Warnings if !has_log => {
            Some(MismatchKind::UnderTestWarningsReferenceNone)
        }
        ExpectedDiagnostics::Clean if has_log => Some(MismatchKind::ReferenceWarningsUnderTestNone),
        _ => None,
    }
}

/// Runtime axis result, with the normalized captures that were compared
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeComparison {
    pub kind: Option<MismatchKind>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// Runtime axis
///
/// Stdout is trimmed on both sides and compared exactly. Stderr is only
/// checked when stdout matched; see [`error_output_matches`].
pub fn classify_runtime(
    expected_stdout: Option<&str>,
    expected_stderr: Option<&str>,
    reference: &RuntimeOutcome,
) -> RuntimeComparison {
    let mut comparison = RuntimeComparison::default();

    if let Some(expected) = expected_stdout {
        let actual = reference.stdout.trim().to_string();
        if expected.trim() != actual {
            comparison.kind = Some(MismatchKind::StdoutMismatch);
        }
        comparison.stdout = Some(actual);
    }

    if let (Some(expected), None) = (expected_stderr, comparison.kind) {
        let actual = adjust_error_output(reference.stderr.trim());
        if !error_output_matches(expected, &actual) {
            comparison.kind = Some(MismatchKind::StderrMismatch);
        }
        comparison.stderr = Some(actual);
    }

    comparison
}

/// Drop the uncaught exception prefix so a dying runtime's trace reads like a
/// printed one
pub fn adjust_error_output(error: &str) -> String {
    match error.strip_prefix(UNCAUGHT_EXCEPTION_PREFIX) {
        Some(rest) => format!("{rest}\n"),
        None => error.to_string(),
    }
}

/// Trimmed exact comparison
///
/// The one exception: an empty expectation also accepts a reference runtime
/// that only complains about a missing entry point.
pub fn error_output_matches(expected: &str, actual: &str) -> bool {
    let expected = expected.trim();
    let actual = actual.trim();
    if expected.is_empty() {
        return actual.is_empty() || is_missing_entry_point(actual);
    }
    expected == actual
}

pub fn is_missing_entry_point(stderr: &str) -> bool {
    let stderr = stderr.trim_start();
    MISSING_ENTRY_POINT_MESSAGES
        .iter()
        .any(|message| stderr.starts_with(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(exit_code: i32, stderr: &str) -> CompileOutcome {
        CompileOutcome::new(exit_code, stderr)
    }

    fn run(stdout: &str, stderr: &str) -> RuntimeOutcome {
        RuntimeOutcome {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_diagnostics_axis_table() {
        use ExpectedDiagnostics::*;
        use MismatchKind::*;

        let cases = [
            (Errors, 1, "", None),
            (Errors, 1, "err\n", None),
            (Errors, 0, "", Some(UnderTestErrorsReferenceNone)),
            (Errors, 0, "warning\n", Some(UnderTestErrorsReferenceWarnings)),
            (Warnings, 1, "err\n", Some(ReferenceErrorsUnderTestWarnings)),
            (Warnings, 0, "", Some(UnderTestWarningsReferenceNone)),
            (Warnings, 0, "warning\n", None),
            (Clean, 1, "err\n", Some(ReferenceErrorsUnderTestNone)),
            (Clean, 0, "warning\n", Some(ReferenceWarningsUnderTestNone)),
            (Clean, 0, "", None),
            (Unchecked, 2, "", Some(ReferenceErrorsUnderTestNone)),
            (Unchecked, 0, "warning\n", None),
        ];
        for (expected, exit, stderr, kind) in cases {
            assert_eq!(
                classify_diagnostics(expected, &outcome(exit, stderr)),
                kind,
                "{expected:?} exit={exit} stderr={stderr:?}"
            );
        }
    }

    #[test]
    fn test_classifier_is_pure() {
        let reference = outcome(0, "");
        let first = classify_diagnostics(ExpectedDiagnostics::Errors, &reference);
        for _ in 0..10 {
            assert_eq!(
                classify_diagnostics(ExpectedDiagnostics::Errors, &reference),
                first
            );
        }
    }

    #[test]
    fn test_expected_diagnostics_from_test_inputs() {
        assert_eq!(ExpectedDiagnostics::new(true, Some("")), ExpectedDiagnostics::Errors);
        assert_eq!(ExpectedDiagnostics::new(false, None), ExpectedDiagnostics::Unchecked);
        assert_eq!(ExpectedDiagnostics::new(false, Some("")), ExpectedDiagnostics::Clean);
        assert_eq!(
            ExpectedDiagnostics::new(false, Some("1. WARNING in X.java")),
            ExpectedDiagnostics::Warnings
        );
    }

    #[test]
    fn test_stdout_trimmed_on_both_sides() {
        let comparison = classify_runtime(Some("1"), None, &run("1\n", ""));
        assert_eq!(comparison.kind, None);
        assert_eq!(comparison.stdout.as_deref(), Some("1"));

        let comparison = classify_runtime(Some("1"), None, &run("2\n", ""));
        assert_eq!(comparison.kind, Some(MismatchKind::StdoutMismatch));
    }

    #[test]
    fn test_stderr_skipped_after_stdout_mismatch() {
        let comparison = classify_runtime(Some("a"), Some(""), &run("b", "boom"));
        assert_eq!(comparison.kind, Some(MismatchKind::StdoutMismatch));
        assert!(comparison.stderr.is_none());
    }

    #[test]
    fn test_stderr_comparison_rules() {
        let trace = "Exception in thread \"main\" java.lang.RuntimeException: x\n\tat X.main(X.java:3)\n";
        let comparison = classify_runtime(
            None,
            Some("java.lang.RuntimeException: x\n\tat X.main(X.java:3)"),
            &run("", trace),
        );
        assert_eq!(comparison.kind, None);
        assert!(comparison.stderr.unwrap().ends_with('\n'));

        let comparison = classify_runtime(None, Some("java.lang.RuntimeException"), &run("", trace));
        assert_eq!(comparison.kind, Some(MismatchKind::StderrMismatch));

        let comparison = classify_runtime(None, Some(""), &run("", "noise"));
        assert_eq!(comparison.kind, Some(MismatchKind::StderrMismatch));

        let comparison = classify_runtime(None, None, &run("", "noise"));
        assert_eq!(comparison.kind, None);
    }

    #[test]
    fn test_missing_entry_point_carve_out() {
        let stderr = "Error: Main method not found in class X, please define the main method as:\n";
        assert!(error_output_matches("", stderr.trim()));
        assert!(!error_output_matches("java.lang.AssertionError", stderr.trim()));
        assert!(!error_output_matches("", "Error: could not find or load main class X"));
        assert!(!error_output_matches("", "boom\nError: Main method not found in class X"));
        assert!(error_output_matches("", "java.lang.NoSuchMethodError: main"));
    }

    #[test]
    fn test_mismatch_set_combinations() {
        let set = MismatchSet::from(MismatchKind::StdoutMismatch).with(MismatchKind::StderrMismatch);
        assert_eq!(set, MismatchSet::OUTPUT_DIFFERS);
        assert!(set.contains(MismatchKind::StderrMismatch));
        assert!(!set.contains(MismatchKind::ReferenceRunAborted));
        assert!(MismatchKind::ReferenceCompileUnlaunchable.is_infrastructure());
        assert_eq!(set.to_string(), "StdoutMismatch | StderrMismatch");
        assert_eq!(MismatchSet::EMPTY.to_string(), "(any)");
    }

    #[test]
    fn test_mismatch_set_serde() {
        let set = MismatchSet::REFERENCE_FOUND_MORE;
        let json = serde_json::to_string(&set).unwrap();
        let back: MismatchSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
        assert_eq!(
            "UnderTestErrorsReferenceNone".parse::<MismatchKind>().unwrap(),
            MismatchKind::UnderTestErrorsReferenceNone
        );
    }
}
