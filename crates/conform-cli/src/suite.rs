//! Suite files
//!
//! A suite is one test class written in TOML:
//!
//! ```toml
//! name = "SwitchTest"
//!
//! [[test]]
//! name = "test001"
//! kind = "negative"
//! expected_log = "..."
//!
//! [[test.sources]]
//! path = "X.java"
//! contents = "public class X {}"
//! ```

use conform_core::{TestCase, TestOrchestrator, TestOutcome};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    /// Must compile without errors
    #[default]
    Conform,
    /// Errors expected unless the expected log only holds warnings
    Negative,
    /// Uses `expect_compiler_errors` as written
    Custom,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuiteEntry {
    #[serde(default)]
    pub kind: TestKind,
    #[serde(flatten)]
    pub case: TestCase,
}

impl SuiteEntry {
    pub async fn run(self, orchestrator: &mut TestOrchestrator) -> conform_core::Result<TestOutcome> {
        match self.kind {
            TestKind::Conform => orchestrator.run_conform_test(self.case).await,
            TestKind::Negative => orchestrator.run_negative_test(self.case).await,
            TestKind::Custom => orchestrator.run_test(self.case).await,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Suite {
    pub name: String,
    #[serde(default, rename = "test")]
    pub tests: Vec<SuiteEntry>,
}

impl Suite {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read suite '{}': {}", path.display(), e))?;
        Self::parse(&content)
            .map_err(|e| anyhow::anyhow!("invalid suite '{}': {}", path.display(), e))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_suite() {
        let suite = Suite::parse(
            r#"
            name = "SampleTest"

            [[test]]
            name = "test001"
            expected_stdout = "SUCCESS"

            [[test.sources]]
            path = "X.java"
            contents = "public class X {}"

            [[test]]
            name = "test002"
            kind = "negative"
            expected_log = "----------\n1. ERROR in X.java (at line 1)\n"

            [[test.sources]]
            path = "X.java"
            contents = "public class X { Zork z; }"
            "#,
        )
        .unwrap();

        assert_eq!(suite.name, "SampleTest");
        assert_eq!(suite.tests.len(), 2);
        assert_eq!(suite.tests[0].kind, TestKind::Conform);
        assert_eq!(suite.tests[0].case.expected_stdout.as_deref(), Some("SUCCESS"));
        assert_eq!(suite.tests[1].kind, TestKind::Negative);
        assert!(suite.tests[1].case.flush_output_directory);
    }

    #[test]
    fn test_rejects_unknown_kind() {
        let result = Suite::parse("name = \"S\"\n[[test]]\nname = \"t\"\nkind = \"maybe\"\n");
        assert!(result.is_err());
    }
}
