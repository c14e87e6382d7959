//! Error types for harness operations

use crate::mismatch::MismatchKind;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the harness
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The compiler under test, or the program it produced, did not meet the
    /// test's own expectations. Never waivable.
    #[error("{test}: {message}")]
    ExpectationFailed { test: String, message: String },

    /// One or more reference installations disagreed with the compiler under
    /// test and no excuse cleared the disagreement.
    #[error("{test}: {} reference comparison failure(s)\n{}", .failures.len(), render_failures(.failures))]
    ComparisonFailed {
        test: String,
        failures: Vec<ComparisonFailure>,
    },

    /// Excuses armed during a test class that never cleared anything
    #[error("unused excuse(s) in {class}: {}", .names.join(", "))]
    UnusedWaivers { class: String, names: Vec<String> },

    /// Subprocess management failures
    #[error(transparent)]
    Process(#[from] crate::process::ProcessError),

    /// Reference version parsing failures
    #[error(transparent)]
    Version(#[from] crate::reference::VersionError),

    /// Configuration loading or validation errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Waiver registry errors (unknown names, malformed waiver files)
    #[error("Waiver error: {message}")]
    WaiverError { message: String },

    /// The compiler under test panicked or failed internally
    #[error("Compiler error: {message}")]
    CompilerError { message: String },

    /// File system I/O errors
    #[error("IO error for path '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error kind enumeration for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Expectation,
    Comparison,
    Waiver,
    Infrastructure,
    Config,
    Io,
}

impl HarnessError {
    /// Get the error kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            HarnessError::ExpectationFailed { .. } => ErrorKind::Expectation,
            HarnessError::ComparisonFailed { .. } => ErrorKind::Comparison,
            HarnessError::UnusedWaivers { .. } | HarnessError::WaiverError { .. } => {
                ErrorKind::Waiver
            }
            HarnessError::Process(_)
            | HarnessError::Version(_)
            | HarnessError::CompilerError { .. } => ErrorKind::Infrastructure,
            HarnessError::ConfigError { .. } => ErrorKind::Config,
            HarnessError::IoError { .. } => ErrorKind::Io,
        }
    }

    /// Create an expectation failure
    pub fn expectation(test: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExpectationFailed {
            test: test.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a waiver error
    pub fn waiver_error(message: impl Into<String>) -> Self {
        Self::WaiverError {
            message: message.into(),
        }
    }

    /// Create a compiler error
    pub fn compiler_error(message: impl Into<String>) -> Self {
        Self::CompilerError {
            message: message.into(),
        }
    }

    /// Create an IO error with path context
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            source,
        }
    }

    /// Mismatch kinds carried by a comparison failure, if any
    pub fn mismatch_kinds(&self) -> Vec<MismatchKind> {
        match self {
            HarnessError::ComparisonFailed { failures, .. } => {
                failures.iter().filter_map(|f| f.kind).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for HarnessError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            path: PathBuf::new(),
            source: err,
        }
    }
}

/// One reference installation's unwaived disagreement
#[derive(Debug, Clone)]
pub struct ComparisonFailure {
    /// Raw version of the reference installation
    pub reference: String,
    /// Classification, absent for failures that happened before classifying
    pub kind: Option<MismatchKind>,
    /// Full two-sided text for triage
    pub details: String,
}

impl std::fmt::Display for ComparisonFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "[{}] {}: {}", self.reference, kind, self.details),
            None => write!(f, "[{}] {}", self.reference, self.details),
        }
    }
}

fn render_failures(failures: &[ComparisonFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_failure_names_kind() {
        let err = HarnessError::ComparisonFailed {
            test: "X#test001".to_string(),
            failures: vec![ComparisonFailure {
                reference: "17.0.2".to_string(),
                kind: Some(MismatchKind::UnderTestErrorsReferenceNone),
                details: "under test found error(s) but reference did not".to_string(),
            }],
        };

        let message = err.to_string();
        assert!(message.contains("UnderTestErrorsReferenceNone"));
        assert!(message.contains("17.0.2"));
        assert_eq!(err.kind(), ErrorKind::Comparison);
        assert_eq!(
            err.mismatch_kinds(),
            vec![MismatchKind::UnderTestErrorsReferenceNone]
        );
    }

    #[test]
    fn test_io_error_kind() {
        let err: HarnessError = std::io::Error::other("boom").into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
