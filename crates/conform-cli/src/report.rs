//! Run reports
//!
//! One JSON and one markdown file per suite run.

use conform_core::{ErrorKind, HarnessError, RunStatistics, TestOutcome};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Result of a single test
#[derive(Debug, Clone, Serialize)]
pub struct TestRecord {
    pub test_name: String,
    pub passed: bool,
    /// Failure category, absent for passing tests
    pub failure: Option<String>,
    pub message: Option<String>,
    /// Unwaived mismatch kinds
    pub mismatches: Vec<String>,
    /// `kind (excuse)` for each waived mismatch
    pub waived: Vec<String>,
    pub references_compared: usize,
    pub duration_ms: u64,
}

impl TestRecord {
    pub fn from_result(
        test_name: String,
        result: &conform_core::Result<TestOutcome>,
        duration_ms: u64,
    ) -> Self {
        match result {
            Ok(outcome) => Self {
                test_name,
                passed: true,
                failure: None,
                message: None,
                mismatches: Vec::new(),
                waived: outcome
                    .comparisons
                    .iter()
                    .filter_map(|c| match (&c.kind, &c.waived_by) {
                        (Some(kind), Some(excuse)) => Some(format!("{kind} ({excuse})")),
                        _ => None,
                    })
                    .collect(),
                references_compared: outcome.comparisons.len(),
                duration_ms,
            },
            Err(err) => Self {
                test_name,
                passed: false,
                failure: Some(failure_category(err).to_string()),
                message: Some(err.to_string()),
                mismatches: err
                    .mismatch_kinds()
                    .into_iter()
                    .map(|kind| kind.to_string())
                    .collect(),
                waived: Vec::new(),
                references_compared: match err {
                    HarnessError::ComparisonFailed { failures, .. } => failures.len(),
                    _ => 0,
                },
                duration_ms,
            },
        }
    }
}

fn failure_category(err: &HarnessError) -> &'static str {
    match err.kind() {
        ErrorKind::Expectation => "expectation",
        ErrorKind::Comparison => "comparison",
        ErrorKind::Waiver => "waiver",
        ErrorKind::Infrastructure => "infrastructure",
        ErrorKind::Config => "config",
        ErrorKind::Io => "io",
    }
}

/// Suite run report
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub suite: String,
    pub total_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
    pub pass_percent: f64,
    pub test_results: Vec<TestRecord>,
    /// Unwaived mismatches by kind
    pub mismatch_counts: BTreeMap<String, usize>,
    /// Class statistics from the suite's final teardown
    pub statistics: Option<RunStatistics>,
    /// Error raised by the final teardown, such as unused excuses
    pub teardown_error: Option<String>,
    pub compiler: String,
    pub references: Vec<String>,
    pub full_log: Option<String>,
    pub timestamp: String,
    pub conform_version: String,
}

impl RunReport {
    pub fn new(suite: String, compiler: String, references: Vec<String>) -> Self {
        Self {
            suite,
            total_tests: 0,
            passed_tests: 0,
            failed_tests: 0,
            pass_percent: 0.0,
            test_results: Vec::new(),
            mismatch_counts: BTreeMap::new(),
            statistics: None,
            teardown_error: None,
            compiler,
            references,
            full_log: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            conform_version: conform_core::VERSION.to_string(),
        }
    }

    pub fn add_result(&mut self, result: TestRecord) {
        self.total_tests += 1;
        if result.passed {
            self.passed_tests += 1;
        } else {
            self.failed_tests += 1;
        }
        for kind in &result.mismatches {
            *self.mismatch_counts.entry(kind.clone()).or_insert(0) += 1;
        }
        self.test_results.push(result);
        self.pass_percent = (self.passed_tests as f64 / self.total_tests as f64) * 100.0;
    }

    pub fn has_failures(&self) -> bool {
        self.failed_tests > 0 || self.teardown_error.is_some()
    }

    /// Generate markdown report
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!("# Conform Report: {}\n\n", self.suite));
        md.push_str(&format!("**Generated**: {}\n\n", self.timestamp));
        md.push_str(&format!("**Compiler under test**: {}\n", self.compiler));
        if self.references.is_empty() {
            md.push_str("**References**: none\n\n");
        } else {
            md.push_str(&format!("**References**: {}\n\n", self.references.join(", ")));
        }

        md.push_str("## Summary\n\n");
        md.push_str(&format!("- **Total Tests**: {}\n", self.total_tests));
        md.push_str(&format!("- **Passed**: {}\n", self.passed_tests));
        md.push_str(&format!("- **Failed**: {}\n", self.failed_tests));
        md.push_str(&format!("- **Pass Rate**: {:.2}%\n", self.pass_percent));
        if let Some(path) = &self.full_log {
            md.push_str(&format!("- **Full log**: `{path}`\n"));
        }
        md.push('\n');

        if let Some(error) = &self.teardown_error {
            md.push_str("## Teardown\n\n");
            md.push_str(&format!("{error}\n\n"));
        }

        if !self.mismatch_counts.is_empty() {
            md.push_str("## Mismatches by Kind\n\n");
            let mut kinds: Vec<_> = self.mismatch_counts.iter().collect();
            kinds.sort_by_key(|(_, count)| std::cmp::Reverse(**count));
            for (kind, count) in kinds {
                md.push_str(&format!("- **{kind}**: {count}\n"));
            }
            md.push('\n');
        }

        md.push_str("## Test Results\n\n");
        md.push_str("| Test | Status | References | Waived | Time (ms) |\n");
        md.push_str("|------|--------|------------|--------|-----------|\n");
        for result in &self.test_results {
            let status = if result.passed { "PASS" } else { "FAIL" };
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                result.test_name,
                status,
                result.references_compared,
                result.waived.len(),
                result.duration_ms
            ));
        }

        if self.failed_tests > 0 {
            md.push_str("\n## Failed Tests Detail\n\n");
            for result in self.test_results.iter().filter(|r| !r.passed) {
                md.push_str(&format!(
                    "### {} ({})\n\n",
                    result.test_name,
                    result.failure.as_deref().unwrap_or("unknown")
                ));
                if let Some(message) = &result.message {
                    md.push_str("```\n");
                    md.push_str(message);
                    md.push_str("\n```\n\n");
                }
            }
        }

        md
    }

    /// Save report to files
    pub fn save(&self, output_dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(output_dir)?;

        let json_path = output_dir.join("conform_report.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(json_path, json)?;

        let md_path = output_dir.join("conform_report.md");
        std::fs::write(md_path, self.to_markdown())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conform_core::{ComparisonFailure, MismatchKind};

    #[test]
    fn test_report_counts() {
        let mut report = RunReport::new("SampleTest".into(), "ecj".into(), vec!["17.0.2".into()]);
        let passing: conform_core::Result<TestOutcome> = Ok(TestOutcome::default());
        report.add_result(TestRecord::from_result("test001".into(), &passing, 5));

        let failing: conform_core::Result<TestOutcome> = Err(HarnessError::ComparisonFailed {
            test: "test002".into(),
            failures: vec![ComparisonFailure {
                reference: "17.0.2".into(),
                kind: Some(MismatchKind::StdoutMismatch),
                details: "standard output mismatch".into(),
            }],
        });
        report.add_result(TestRecord::from_result("test002".into(), &failing, 7));

        assert_eq!(report.total_tests, 2);
        assert_eq!(report.failed_tests, 1);
        assert_eq!(report.mismatch_counts.get("StdoutMismatch"), Some(&1));
        assert!(report.has_failures());

        let md = report.to_markdown();
        assert!(md.contains("| test002 | FAIL | 1 | 0 | 7 |"));
        assert!(md.contains("### test002 (comparison)"));
    }

    #[test]
    fn test_save_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let report = RunReport::new("S".into(), "ecj".into(), Vec::new());
        report.save(dir.path()).unwrap();
        assert!(dir.path().join("conform_report.json").is_file());
        assert!(dir.path().join("conform_report.md").is_file());
    }
}
