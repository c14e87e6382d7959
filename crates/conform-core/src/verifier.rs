//! Running programs produced by the compiler under test
//!
//! The orchestrator owns one [`ExecutionVerifier`] at a time. Tests that pass
//! VM arguments get a fresh verifier before and after their run, built by the
//! [`VerifierFactory`].

use crate::process::{CommandLine, ProcessRunner};
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

#[cfg(windows)]
const PATH_LIST_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const PATH_LIST_SEPARATOR: &str = ":";

/// What to run and what it should print
#[derive(Debug, Clone, Default)]
pub struct VerificationRequest {
    pub source_file: String,
    pub class_name: String,
    pub expected_stdout: Option<String>,
    pub expected_stderr: Option<String>,
    pub classpath: Vec<PathBuf>,
    pub vm_arguments: Vec<String>,
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub passed: bool,
    pub failure_reason: Option<String>,
    pub stdout: String,
    pub stderr: String,
}

impl VerificationOutcome {
    pub fn passed(stdout: String, stderr: String) -> Self {
        Self {
            passed: true,
            failure_reason: None,
            stdout,
            stderr,
        }
    }

    pub fn failed(reason: impl Into<String>, stdout: String, stderr: String) -> Self {
        Self {
            passed: false,
            failure_reason: Some(reason.into()),
            stdout,
            stderr,
        }
    }
}

#[async_trait]
pub trait ExecutionVerifier: Send {
    async fn verify(&mut self, request: &VerificationRequest) -> Result<VerificationOutcome>;

    /// Release whatever the verifier keeps running between requests
    async fn shut_down(&mut self);
}

pub trait VerifierFactory: Send + Sync {
    fn create(&self, vm_arguments: &[String]) -> Box<dyn ExecutionVerifier>;
}

/// `p/X.java` runs as `p.X`; descriptor units are never run
pub fn entry_point_for(source_file: &str) -> Option<String> {
    let unit = crate::under_test::CompilationUnit::new(source_file, "");
    if unit.is_descriptor() {
        None
    } else {
        Some(unit.type_name())
    }
}

/// Stdout: trimmed, exact. Stderr: empty means exactly empty, anything else
/// is a prefix. `None` skips either check.
pub fn check_outputs(
    expected_stdout: Option<&str>,
    expected_stderr: Option<&str>,
    stdout: &str,
    stderr: &str,
) -> Option<String> {
    if let Some(expected) = expected_stdout {
        if expected.trim() != stdout.trim() {
            return Some(format!(
                "Standard output does not match.\nExpected: {:?}\nActual:   {:?}",
                expected.trim(),
                stdout.trim()
            ));
        }
    }
    if let Some(expected) = expected_stderr {
        let actual = stderr.trim();
        let matches = if expected.is_empty() {
            actual.is_empty()
        } else {
            actual.starts_with(expected)
        };
        if !matches {
            return Some(format!(
                "Standard error does not match.\nExpected start: {expected:?}\nActual:         {actual:?}"
            ));
        }
    }
    None
}

/// Launches a runtime executable once per request
#[derive(Debug, Clone)]
pub struct ProcessVerifier {
    runtime: PathBuf,
    vm_arguments: Vec<String>,
    runner: ProcessRunner,
    runs: usize,
}

impl ProcessVerifier {
    pub fn new(runtime: impl Into<PathBuf>, vm_arguments: Vec<String>, runner: ProcessRunner) -> Self {
        Self {
            runtime: runtime.into(),
            vm_arguments,
            runner,
            runs: 0,
        }
    }

    pub fn runs(&self) -> usize {
        self.runs
    }

    pub fn command_line(&self, request: &VerificationRequest) -> CommandLine {
        let mut command = CommandLine::new(self.runtime.to_string_lossy());
        if !request.classpath.is_empty() {
            let classpath = request
                .classpath
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(PATH_LIST_SEPARATOR);
            command = command.arg("-classpath").arg(classpath);
        }
        command
            .args(self.vm_arguments.iter().cloned())
            .args(request.vm_arguments.iter().cloned())
            .arg(request.class_name.clone())
    }
}

#[async_trait]
impl ExecutionVerifier for ProcessVerifier {
    async fn verify(&mut self, request: &VerificationRequest) -> Result<VerificationOutcome> {
        let command = self.command_line(request);
        let output = self.runner.run(&request.work_dir, &command).await?;
        self.runs += 1;
        debug!("Verified {} (exit {})", request.class_name, output.exit_code);

        let reason = check_outputs(
            request.expected_stdout.as_deref(),
            request.expected_stderr.as_deref(),
            &output.stdout,
            &output.stderr,
        );
        Ok(match reason {
            None => VerificationOutcome::passed(output.stdout, output.stderr),
            Some(reason) => VerificationOutcome::failed(reason, output.stdout, output.stderr),
        })
    }

    async fn shut_down(&mut self) {
        debug!("Shutting down verifier after {} run(s)", self.runs);
        self.runs = 0;
    }
}

#[derive(Debug, Clone)]
pub struct ProcessVerifierFactory {
    runtime: PathBuf,
    runner: ProcessRunner,
}

impl ProcessVerifierFactory {
    pub fn new(runtime: impl Into<PathBuf>, runner: ProcessRunner) -> Self {
        Self {
            runtime: runtime.into(),
            runner,
        }
    }
}

impl VerifierFactory for ProcessVerifierFactory {
    fn create(&self, vm_arguments: &[String]) -> Box<dyn ExecutionVerifier> {
        Box::new(ProcessVerifier::new(
            self.runtime.clone(),
            vm_arguments.to_vec(),
            self.runner.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_points() {
        assert_eq!(entry_point_for("p/X.java").as_deref(), Some("p.X"));
        assert_eq!(entry_point_for("X.java").as_deref(), Some("X"));
        assert!(entry_point_for("p/package-info.java").is_none());
        assert!(entry_point_for("module-info.java").is_none());
    }

    #[test]
    fn test_check_outputs() {
        assert!(check_outputs(Some("1"), None, "1\n", "ignored").is_none());
        assert!(check_outputs(Some("1"), None, "2\n", "").is_some());
        assert!(check_outputs(None, Some(""), "", "").is_none());
        assert!(check_outputs(None, Some(""), "", "oops").is_some());
        assert!(check_outputs(None, Some("java.lang.Error"), "", "java.lang.Error: x\n\tat X").is_none());
        assert!(check_outputs(None, None, "anything", "anything").is_none());
    }

    #[test]
    fn test_command_line() {
        let verifier = ProcessVerifier::new("/jdk/bin/java", vec!["-Xss1m".into()], ProcessRunner::new());
        let request = VerificationRequest {
            class_name: "p.X".into(),
            classpath: vec![PathBuf::from("/out")],
            vm_arguments: vec!["-ea".into()],
            ..Default::default()
        };
        assert_eq!(
            verifier.command_line(&request).arguments(),
            &["-classpath", "/out", "-Xss1m", "-ea", "p.X"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_verify_through_process() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ProcessVerifierFactory::new("echo", ProcessRunner::new());
        let mut verifier = factory.create(&[]);
        let request = VerificationRequest {
            source_file: "X.java".into(),
            class_name: "X".into(),
            expected_stdout: Some("X".into()),
            work_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        let outcome = verifier.verify(&request).await.unwrap();
        assert!(outcome.passed, "{:?}", outcome.failure_reason);
        assert_eq!(outcome.stdout, "X\n");

        let request = VerificationRequest {
            expected_stdout: Some("Y".into()),
            ..request
        };
        let outcome = verifier.verify(&request).await.unwrap();
        assert!(!outcome.passed);
        verifier.shut_down().await;
    }
}
