//! Running one test: the compiler under test first, then every matching
//! reference installation
//!
//! Expectation failures stop a test before any reference work. Reference
//! disagreements are collected per installation so that one broken
//! installation does not hide what the others report.

use crate::config::HarnessConfig;
use crate::error::{ComparisonFailure, HarnessError};
use crate::mismatch::{classify_diagnostics, classify_runtime, ExpectedDiagnostics, MismatchKind};
use crate::process::ProcessError;
use crate::reference::{ReferenceCompiler, ReferenceRegistry, ReleaseTier, RuntimeCache};
use crate::result::ResultExt;
use crate::stats::{ClassSession, FullLog, RunStatistics};
use crate::under_test::environment::default_classpath;
use crate::under_test::options::COMPLIANCE;
use crate::under_test::{
    CompilationUnit, CompilerOptions, CompilerUnderTest, DiagnosticSink, EnvironmentGuard,
    InMemoryNameEnvironment, LogMatcher, Requestor,
};
use crate::verifier::{entry_point_for, ExecutionVerifier, VerificationOutcome, VerificationRequest, VerifierFactory};
use crate::waiver::{Excuse, WaiverLedger, WaiverRegistry};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

const SOURCE_SUFFIX: &str = ".java";
const TEST_SEPARATOR: &str = "-----------------------------------------------------------------";
const FAILURE_SEPARATOR: &str = "----------------------------------------";

/// How a test is compared with reference installations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceOptions {
    /// Reference compiler options, as one command-line fragment
    pub options: String,
    /// Do not compare this test at all
    pub skip: bool,
    /// Only compare with installations at or above this tier
    pub min_tier: Option<ReleaseTier>,
    /// Name of a registered excuse for known disagreements
    pub excuse: Option<String>,
    /// Hand class libraries over as `--module-path` instead of `-classpath`
    pub libraries_on_module_path: bool,
}

impl ReferenceOptions {
    pub fn new(options: impl Into<String>) -> Self {
        Self {
            options: options.into(),
            ..Self::default()
        }
    }

    pub fn skip() -> Self {
        Self {
            skip: true,
            ..Self::default()
        }
    }

    /// Options targeting `tier`, `--release N` where supported
    pub fn for_release(tier: ReleaseTier) -> Self {
        Self::new(tier.release_options())
    }

    pub fn with_excuse(mut self, name: impl Into<String>) -> Self {
        self.excuse = Some(name.into());
        self
    }

    pub fn with_min_tier(mut self, tier: ReleaseTier) -> Self {
        self.min_tier = Some(tier);
        self
    }

    /// Whether `compiler` takes part in the comparison at `compliance`
    pub fn selects(&self, compiler: &ReferenceCompiler, compliance: ReleaseTier) -> bool {
        !self.skip
            && compiler.tier() == compliance
            && self.min_tier.is_none_or(|min| compiler.tier() >= min)
    }

    /// Final option string: output, lint and implicit-compilation defaults
    /// appended when absent, then the non-platform class libraries
    pub fn command_options(&self, libraries: &[PathBuf]) -> String {
        let mut options = self.options.clone();
        if !options.contains(" -d ") {
            options.push_str(" -d .");
        }
        if !options.contains(" -Xlint") {
            options.push_str(" -Xlint");
        }
        if !options.contains(" -implicit") {
            options.push_str(" -implicit:none");
        }
        if !libraries.is_empty() {
            let joined = std::env::join_paths(libraries)
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|_| {
                    libraries
                        .iter()
                        .map(|p| p.to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join(" ")
                });
            options.push_str(if self.libraries_on_module_path {
                " --module-path "
            } else {
                " -classpath "
            });
            options.push_str(&joined);
        }
        options
    }
}

/// One test: its sources and everything expected of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestCase {
    pub name: String,
    /// Sources, in order; the first one names the entry point
    pub sources: Vec<CompilationUnit>,
    /// Extra sources visible to the name environment but not compiled
    pub dependents: Vec<CompilationUnit>,
    pub expect_compiler_errors: bool,
    /// Problem log of the compiler under test
    pub expected_log: Option<String>,
    /// Other logs accepted in place of `expected_log`
    pub alternate_logs: Vec<String>,
    pub expected_stdout: Option<String>,
    pub expected_stderr: Option<String>,
    /// Stdout expected of reference runs when it differs from `expected_stdout`
    pub expected_reference_stdout: Option<String>,
    pub vm_arguments: Vec<String>,
    /// Overrides merged over the test defaults
    pub options: Option<CompilerOptions>,
    /// Run the program even when the compiler under test reported errors
    pub force_execution: bool,
    pub flush_output_directory: bool,
    pub generate_output: bool,
    pub show_category: bool,
    pub show_warning_token: bool,
    pub swallow_capture_ids: bool,
    /// Replaces the default classpath (output directory then platform libraries)
    pub classpath: Option<Vec<PathBuf>>,
    /// Appended to the classpath and passed on to reference compilers
    pub class_libraries: Vec<PathBuf>,
    /// Overrides the configured compliance tier
    pub compliance: Option<ReleaseTier>,
    pub reference: ReferenceOptions,
}

impl Default for TestCase {
    fn default() -> Self {
        Self {
            name: String::new(),
            sources: Vec::new(),
            dependents: Vec::new(),
            expect_compiler_errors: false,
            expected_log: None,
            alternate_logs: Vec::new(),
            expected_stdout: None,
            expected_stderr: None,
            expected_reference_stdout: None,
            vm_arguments: Vec::new(),
            options: None,
            force_execution: false,
            flush_output_directory: true,
            generate_output: true,
            show_category: false,
            show_warning_token: false,
            swallow_capture_ids: false,
            classpath: None,
            class_libraries: Vec::new(),
            compliance: None,
            reference: ReferenceOptions::default(),
        }
    }
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn source(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.sources.push(CompilationUnit::new(path, contents));
        self
    }

    pub fn dependent(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.dependents.push(CompilationUnit::new(path, contents));
        self
    }

    pub fn expect_errors(mut self, expect: bool) -> Self {
        self.expect_compiler_errors = expect;
        self
    }

    pub fn expected_log(mut self, log: impl Into<String>) -> Self {
        self.expected_log = Some(log.into());
        self
    }

    pub fn alternate_log(mut self, log: impl Into<String>) -> Self {
        self.alternate_logs.push(log.into());
        self
    }

    pub fn expected_output(mut self, stdout: impl Into<String>) -> Self {
        self.expected_stdout = Some(stdout.into());
        self
    }

    pub fn expected_error_output(mut self, stderr: impl Into<String>) -> Self {
        self.expected_stderr = Some(stderr.into());
        self
    }

    pub fn expected_reference_output(mut self, stdout: impl Into<String>) -> Self {
        self.expected_reference_stdout = Some(stdout.into());
        self
    }

    pub fn vm_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vm_arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    pub fn options(mut self, options: CompilerOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn force_execution(mut self) -> Self {
        self.force_execution = true;
        self
    }

    pub fn keep_output_directory(mut self) -> Self {
        self.flush_output_directory = false;
        self
    }

    pub fn generate_output(mut self, generate: bool) -> Self {
        self.generate_output = generate;
        self
    }

    pub fn show_category(mut self) -> Self {
        self.show_category = true;
        self
    }

    pub fn show_warning_token(mut self) -> Self {
        self.show_warning_token = true;
        self
    }

    pub fn swallow_capture_ids(mut self) -> Self {
        self.swallow_capture_ids = true;
        self
    }

    pub fn classpath(mut self, classpath: Vec<PathBuf>) -> Self {
        self.classpath = Some(classpath);
        self
    }

    pub fn class_library(mut self, library: impl Into<PathBuf>) -> Self {
        self.class_libraries.push(library.into());
        self
    }

    pub fn compliance(mut self, tier: ReleaseTier) -> Self {
        self.compliance = Some(tier);
        self
    }

    pub fn reference(mut self, options: ReferenceOptions) -> Self {
        self.reference = options;
        self
    }

    fn has_expected_output(&self) -> bool {
        self.expected_stdout.is_some() || self.expected_stderr.is_some()
    }

    fn source_file_names(&self) -> Vec<String> {
        self.sources.iter().map(|unit| unit.path.clone()).collect()
    }
}

/// What one reference installation said about a test
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceComparison {
    pub reference: String,
    pub kind: Option<MismatchKind>,
    /// Excuse that cleared `kind`
    pub waived_by: Option<String>,
    pub diagnostics: String,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// Everything a passing test produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestOutcome {
    pub name: String,
    pub problem_log: String,
    pub has_errors: bool,
    pub execution: Option<ExecutionSummary>,
    pub comparisons: Vec<ReferenceComparison>,
    /// Counters of the class this test closed, if it was the last one
    pub class_statistics: Option<RunStatistics>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    pub stdout: String,
    pub stderr: String,
}

impl From<VerificationOutcome> for ExecutionSummary {
    fn from(outcome: VerificationOutcome) -> Self {
        Self {
            stdout: outcome.stdout,
            stderr: outcome.stderr,
        }
    }
}

pub struct TestOrchestrator {
    config: HarnessConfig,
    compiler: Arc<dyn CompilerUnderTest>,
    verifier_factory: Option<Arc<dyn VerifierFactory>>,
    verifier: Option<Box<dyn ExecutionVerifier>>,
    waivers: Arc<WaiverRegistry>,
    references: Vec<Arc<ReferenceCompiler>>,
    runtimes: RuntimeCache,
    session: Option<ClassSession>,
    test_ledger: WaiverLedger,
    full_log: Option<FullLog>,
}

impl std::fmt::Debug for TestOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestOrchestrator")
            .field("compiler", &self.compiler.name())
            .field("references", &self.references.len())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl TestOrchestrator {
    pub fn new(config: HarnessConfig, compiler: Arc<dyn CompilerUnderTest>) -> Self {
        Self {
            config,
            compiler,
            verifier_factory: None,
            verifier: None,
            waivers: Arc::new(WaiverRegistry::builtin()),
            references: Vec::new(),
            runtimes: RuntimeCache::new(),
            session: None,
            test_ledger: WaiverLedger::new(),
            full_log: None,
        }
    }

    pub fn with_verifier_factory(mut self, factory: Arc<dyn VerifierFactory>) -> Self {
        self.verifier_factory = Some(factory);
        self
    }

    pub fn with_waivers(mut self, waivers: Arc<WaiverRegistry>) -> Self {
        self.waivers = waivers;
        self
    }

    pub fn with_references(mut self, references: Vec<Arc<ReferenceCompiler>>) -> Self {
        self.references = references;
        self
    }

    /// Probe the configured installation roots, when comparison is enabled
    pub async fn resolve_references(&mut self, registry: &ReferenceRegistry) -> Result<usize> {
        if !self.config.run_reference {
            return Ok(0);
        }
        self.references = registry
            .resolve(&self.config.reference_roots, &self.config.runner())
            .await?;
        Ok(self.references.len())
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn references(&self) -> &[Arc<ReferenceCompiler>] {
        &self.references
    }

    pub fn full_log_path(&self) -> Option<&Path> {
        self.full_log.as_ref().map(FullLog::path)
    }

    fn comparison_enabled(&self) -> bool {
        self.config.run_reference && !self.references.is_empty()
    }

    fn ensure_full_log(&mut self) -> Result<()> {
        if self.full_log.is_some() || !self.comparison_enabled() {
            return Ok(());
        }
        let primary = self.references[0].raw_version().to_string();
        let log = FullLog::create(&self.config.output_dir, &primary)?;
        info!("Reference compiler output archived into {}", log.path().display());
        self.full_log = Some(log);
        Ok(())
    }

    /// Start a test class of `test_count` tests; its summary and unused
    /// excuses are reported when the last one finishes
    pub fn begin_class(&mut self, class: impl Into<String>, test_count: usize) -> Result<()> {
        if let Some(previous) = &self.session {
            warn!(
                "Class {} left with {} test(s) not run",
                previous.class(),
                previous.remaining()
            );
        }
        self.ensure_full_log()?;
        let session = ClassSession::new(class, test_count);
        if self.comparison_enabled() {
            session.begin(self.full_log.as_mut())?;
        }
        self.session = Some(session);
        Ok(())
    }

    /// A test the compiler under test must accept
    pub async fn run_conform_test(&mut self, test: TestCase) -> Result<TestOutcome> {
        self.run_test(test.expect_errors(false)).await
    }

    /// A test with an expected problem log; errors are expected unless the
    /// log only holds warnings
    pub async fn run_negative_test(&mut self, test: TestCase) -> Result<TestOutcome> {
        let expect_errors = test
            .expected_log
            .as_deref()
            .is_none_or(|log| log.contains("ERROR"));
        self.run_test(test.expect_errors(expect_errors)).await
    }

    pub async fn run_test(&mut self, test: TestCase) -> Result<TestOutcome> {
        self.run_test_with_sink(test, None).await
    }

    /// Run `test`, handing every reported problem to `sink` as well
    pub async fn run_test_with_sink(
        &mut self,
        test: TestCase,
        sink: Option<Box<dyn DiagnosticSink>>,
    ) -> Result<TestOutcome> {
        let result = self.execute(&test, sink).await;
        let teardown = self.finish_test(&test.name);
        match (result, teardown) {
            (Ok(mut outcome), Ok(statistics)) => {
                outcome.class_statistics = statistics;
                Ok(outcome)
            }
            (Err(err), teardown) => {
                if let Err(teardown_err) = teardown {
                    error!("{}", teardown_err);
                }
                Err(err)
            }
            (Ok(_), Err(err)) => Err(err),
        }
    }

    fn finish_test(&mut self, test_name: &str) -> Result<Option<RunStatistics>> {
        let Some(session) = self.session.as_mut() else {
            return self.test_ledger.sweep_into_result(test_name).map(|_| None);
        };
        let log = if self.config.run_reference {
            self.full_log.as_mut()
        } else {
            None
        };
        let finished = session.finish_test(log);
        if session.remaining() == 0 {
            self.session = None;
        }
        finished
    }

    /// Shut the verifier down and flush the full log
    pub async fn shut_down(&mut self) {
        if let Some(mut verifier) = self.verifier.take() {
            verifier.shut_down().await;
        }
        if let Some(log) = self.full_log.as_mut() {
            log.flush().log_and_continue();
        }
    }

    fn qualified_name(&self, test: &TestCase) -> String {
        match &self.session {
            Some(session) => format!("{} {}", session.class(), test.name),
            None => test.name.clone(),
        }
    }

    async fn execute(
        &mut self,
        test: &TestCase,
        sink: Option<Box<dyn DiagnosticSink>>,
    ) -> Result<TestOutcome> {
        let name = self.qualified_name(test);
        if test.sources.is_empty() {
            return Err(HarnessError::expectation(&name, "test has no source files"));
        }

        let output_dir = self.config.under_test_dir();
        if test.flush_output_directory {
            remove_dir_if_present(&output_dir)?;
        }
        std::fs::create_dir_all(&output_dir).map_err(|e| HarnessError::io_error(&output_dir, e))?;

        let compliance = test.compliance.unwrap_or(self.config.compliance);
        let mut options = CompilerOptions::merged_with(test.options.as_ref());
        if options.get(COMPLIANCE).is_none() {
            options.set(COMPLIANCE, compliance.to_string());
        }

        let mut classpath = test
            .classpath
            .clone()
            .unwrap_or_else(|| default_classpath(&output_dir, &self.config.platform_libraries));
        classpath.extend(test.class_libraries.iter().cloned());

        let mut requestor = Requestor::new(&output_dir, test.generate_output)
            .show_category(test.show_category)
            .show_warning_token(test.show_warning_token);
        if let Some(sink) = sink {
            requestor = requestor.with_sink(sink);
        }

        {
            let environment = EnvironmentGuard::new(Box::new(InMemoryNameEnvironment::new(
                test.sources.iter().chain(&test.dependents),
                classpath.clone(),
            )));
            debug!("Compiling {} with {}", name, self.compiler.name());
            self.compiler
                .compile(&test.sources, &options, &*environment, &mut requestor)
                .await?;
        }

        self.check_log(test, &name, &requestor)?;

        let mut outcome = TestOutcome {
            name: name.clone(),
            problem_log: requestor.problem_log().to_string(),
            has_errors: requestor.has_errors(),
            ..TestOutcome::default()
        };

        if (!requestor.has_errors() || test.force_execution)
            && (test.has_expected_output() || test.force_execution)
        {
            outcome.execution = self.verify_execution(test, &name, &output_dir, classpath).await?;
        }

        if self.comparison_enabled() && !test.reference.skip {
            outcome.comparisons = self
                .compare_with_references(test, &name, compliance, requestor.problem_log())
                .await?;
        }
        Ok(outcome)
    }

    fn check_log(&self, test: &TestCase, name: &str, requestor: &Requestor) -> Result<()> {
        let actual = requestor.problem_log();
        if let Some(expected) = &test.expected_log {
            let accepted: Vec<&str> = std::iter::once(expected.as_str())
                .chain(test.alternate_logs.iter().map(String::as_str))
                .collect();
            let matcher = LogMatcher::new().swallow_capture_ids(test.swallow_capture_ids);
            if let Err(diff) = matcher.check(&accepted, actual) {
                log_sources(&test.sources);
                return Err(HarnessError::expectation(
                    name,
                    format!("Invalid problem log\n{diff}"),
                ));
            }
        }

        if test.expect_compiler_errors && !requestor.has_errors() {
            log_sources(&test.sources);
            return Err(HarnessError::expectation(name, "Unexpected success"));
        }
        if !test.expect_compiler_errors && requestor.has_errors() {
            log_sources(&test.sources);
            return Err(HarnessError::expectation(
                name,
                format!("Unexpected failure\n{actual}"),
            ));
        }
        Ok(())
    }

    async fn verify_execution(
        &mut self,
        test: &TestCase,
        name: &str,
        output_dir: &Path,
        classpath: Vec<PathBuf>,
    ) -> Result<Option<ExecutionSummary>> {
        let Some(factory) = self.verifier_factory.clone() else {
            debug!("No execution verifier configured, not running {}", name);
            return Ok(None);
        };
        let Some(class_name) = entry_point_for(&test.sources[0].path) else {
            return Ok(None);
        };

        let custom_vm = !test.vm_arguments.is_empty();
        if custom_vm {
            if let Some(mut previous) = self.verifier.take() {
                previous.shut_down().await;
            }
            self.verifier = Some(factory.create(&test.vm_arguments));
        }
        let verifier = self.verifier.get_or_insert_with(|| factory.create(&[]));

        let request = VerificationRequest {
            source_file: test.sources[0].path.clone(),
            class_name,
            expected_stdout: test.expected_stdout.clone(),
            expected_stderr: test.expected_stderr.clone(),
            classpath,
            vm_arguments: Vec::new(),
            work_dir: output_dir.to_path_buf(),
        };
        let verified = verifier.verify(&request).await;

        if custom_vm {
            if let Some(mut used) = self.verifier.take() {
                used.shut_down().await;
            }
        }

        let verified = verified?;
        if !verified.passed {
            eprintln!("[ERR]:{}", verified.stderr);
            eprintln!("[OUT]:{}", verified.stdout);
            log_sources(&test.sources);
            let reason = verified
                .failure_reason
                .unwrap_or_else(|| "Execution failed".to_string());
            return Err(HarnessError::expectation(name, reason));
        }
        Ok(Some(verified.into()))
    }

    async fn compare_with_references(
        &mut self,
        test: &TestCase,
        name: &str,
        compliance: ReleaseTier,
        under_test_log: &str,
    ) -> Result<Vec<ReferenceComparison>> {
        let excuse = match &test.reference.excuse {
            Some(excuse_name) => Some(self.waivers.require(excuse_name)?),
            None => None,
        };
        self.ensure_full_log()?;
        self.log_line(TEST_SEPARATOR);
        self.log_line(name);

        let references: Vec<Arc<ReferenceCompiler>> = self
            .references
            .iter()
            .filter(|compiler| test.reference.selects(compiler, compliance))
            .cloned()
            .collect();

        let mut comparisons = Vec::with_capacity(references.len());
        let mut failures = Vec::new();
        let mut reference_failed = false;

        for compiler in references {
            let in_force = excuse
                .as_ref()
                .filter(|excuse| excuse.excuse_for(&compiler).is_some())
                .cloned();
            if let Some(excuse) = &in_force {
                self.ledger().arm(excuse, compiler.raw_version(), name);
            }

            let comparison = match self
                .compare_one(&compiler, test, in_force.as_deref(), &mut reference_failed)
                .await
            {
                Ok(comparison) => comparison,
                Err(err) => {
                    error!("{}: reference {} failed: {}", name, compiler.raw_version(), err);
                    failures.push(ComparisonFailure {
                        reference: compiler.raw_version().to_string(),
                        kind: None,
                        details: err.to_string(),
                    });
                    continue;
                }
            };

            let Some(kind) = comparison.kind else {
                comparisons.push(comparison);
                continue;
            };

            if let Some(session) = self.session.as_mut() {
                session.statistics_mut().record(kind);
            }
            // Aborted or unlaunchable toolchains always fail the test
            let waived = match &in_force {
                Some(excuse) if !kind.is_infrastructure() => {
                    self.ledger()
                        .consult(excuse, compiler.raw_version(), name, kind)
                }
                _ => false,
            };

            if waived {
                let excuse_name = in_force.as_ref().map(|e| e.name().to_string());
                warn!(
                    "{}: {} waived by {} for reference {}",
                    name,
                    kind,
                    excuse_name.as_deref().unwrap_or_default(),
                    compiler.raw_version()
                );
                self.log_line(&format!("WAIVED: {}", kind.describe()));
                comparisons.push(ReferenceComparison {
                    waived_by: excuse_name,
                    ..comparison
                });
            } else {
                self.log_line(&format!("MISMATCH: {}", kind.describe()));
                let details = failure_details(kind, test, under_test_log, &comparison);
                println!("{FAILURE_SEPARATOR}");
                println!("{name} - {details}");
                log_sources(&test.sources);
                failures.push(ComparisonFailure {
                    reference: comparison.reference.clone(),
                    kind: Some(kind),
                    details,
                });
                comparisons.push(comparison);
            }
        }

        if failures.is_empty() {
            Ok(comparisons)
        } else {
            Err(HarnessError::ComparisonFailed {
                test: name.to_string(),
                failures,
            })
        }
    }

    async fn compare_one(
        &mut self,
        compiler: &Arc<ReferenceCompiler>,
        test: &TestCase,
        excuse: Option<&Excuse>,
        reference_failed: &mut bool,
    ) -> Result<ReferenceComparison> {
        let work_dir = self.config.reference_dir(compiler.raw_version());
        if test.flush_output_directory {
            remove_dir_if_present(&work_dir)?;
        } else {
            delete_source_files(&work_dir).log_and_continue();
        }
        write_sources(&work_dir, &test.sources)?;

        let libraries: Vec<PathBuf> = test
            .class_libraries
            .iter()
            .filter(|lib| !lib.starts_with(compiler.root()))
            .cloned()
            .collect();
        let mut options = test.reference.command_options(&libraries);
        if let Some(extra) = excuse.and_then(Excuse::extra_options) {
            options.push(' ');
            options.push_str(extra.trim());
        }

        let mut comparison = ReferenceComparison {
            reference: compiler.raw_version().to_string(),
            kind: None,
            waived_by: None,
            diagnostics: String::new(),
            stdout: None,
            stderr: None,
        };

        match compiler.compile(&work_dir, &options, &test.source_file_names()).await {
            Ok(outcome) => {
                if !outcome.diagnostics().is_empty() {
                    self.log_line("--- reference err: ---");
                    self.log_line(outcome.diagnostics());
                }
                if outcome.failed() {
                    *reference_failed = true;
                }
                let expected = ExpectedDiagnostics::new(
                    test.expect_compiler_errors,
                    test.expected_log.as_deref(),
                );
                comparison.kind = classify_diagnostics(expected, &outcome);
                comparison.diagnostics = outcome.diagnostics().to_string();
            }
            Err(err) => {
                error!("Reference compiler {} failed: {}", compiler.raw_version(), err);
                comparison.kind = Some(compile_failure_kind(&err));
                comparison.diagnostics = err.to_string();
                return Ok(comparison);
            }
        }

        // Runs only when both sides compiled cleanly so far in this test
        let entry_point = match entry_point_for(&test.sources[0].path) {
            Some(entry)
                if test.has_expected_output()
                    && !*reference_failed
                    && comparison.kind.is_none() =>
            {
                entry
            }
            _ => return Ok(comparison),
        };

        let runtime = self.runtimes.runtime_for(compiler);
        let vm_options = test.vm_arguments.join(" ");
        match runtime.execute(&work_dir, &vm_options, &entry_point).await {
            Ok(run) => {
                let expected_stdout = test
                    .expected_reference_stdout
                    .as_deref()
                    .or(test.expected_stdout.as_deref());
                let runtime_comparison =
                    classify_runtime(expected_stdout, test.expected_stderr.as_deref(), &run);
                comparison.kind = runtime_comparison.kind;
                comparison.stdout = runtime_comparison.stdout;
                comparison.stderr = runtime_comparison.stderr;
            }
            Err(err) => {
                error!("Reference runtime {} failed: {}", compiler.raw_version(), err);
                comparison.kind = Some(run_failure_kind(&err));
                comparison.stderr = Some(err.to_string());
            }
        }
        Ok(comparison)
    }

    fn ledger(&mut self) -> &mut WaiverLedger {
        match self.session.as_mut() {
            Some(session) => session.ledger_mut(),
            None => &mut self.test_ledger,
        }
    }

    fn log_line(&mut self, message: &str) {
        if let Some(log) = self.full_log.as_mut() {
            log.line(message).log_and_continue();
        }
    }
}

fn compile_failure_kind(err: &ProcessError) -> MismatchKind {
    if err.is_unlaunchable() {
        MismatchKind::ReferenceCompileUnlaunchable
    } else {
        MismatchKind::ReferenceCompileAborted
    }
}

fn run_failure_kind(err: &ProcessError) -> MismatchKind {
    if err.is_unlaunchable() {
        MismatchKind::ReferenceRunUnlaunchable
    } else {
        MismatchKind::ReferenceRunAborted
    }
}

/// Both sides of a disagreement, as text
fn failure_details(
    kind: MismatchKind,
    test: &TestCase,
    under_test_log: &str,
    comparison: &ReferenceComparison,
) -> String {
    let (expected, actual) = match kind {
        MismatchKind::StdoutMismatch => (
            test.expected_reference_stdout
                .as_deref()
                .or(test.expected_stdout.as_deref())
                .unwrap_or_default()
                .to_string(),
            comparison.stdout.clone().unwrap_or_default(),
        ),
        MismatchKind::StderrMismatch => (
            test.expected_stderr.clone().unwrap_or_default(),
            comparison.stderr.clone().unwrap_or_default(),
        ),
        MismatchKind::ReferenceRunAborted | MismatchKind::ReferenceRunUnlaunchable => (
            String::new(),
            comparison.stderr.clone().unwrap_or_default(),
        ),
        _ => (under_test_log.to_string(), comparison.diagnostics.clone()),
    };
    format!(
        "{}\n--- under test ---\n{}\n--- reference {} ---\n{}",
        kind.describe(),
        expected,
        comparison.reference,
        actual
    )
}

fn log_sources(sources: &[CompilationUnit]) {
    eprintln!("{FAILURE_SEPARATOR}");
    for unit in sources {
        eprintln!("[{}]", unit.path);
        eprintln!("{}", unit.contents);
    }
}

fn write_sources(dir: &Path, sources: &[CompilationUnit]) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| HarnessError::io_error(dir, e))?;
    for unit in sources {
        let path = dir.join(&unit.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HarnessError::io_error(parent, e))?;
        }
        std::fs::write(&path, &unit.contents).map_err(|e| HarnessError::io_error(&path, e))?;
    }
    Ok(())
}

fn remove_dir_if_present(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HarnessError::io_error(dir, e)),
    }
}

/// Remove leftover sources but keep compiled classes
fn delete_source_files(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if entry.file_type().is_file() && path.to_string_lossy().ends_with(SOURCE_SUFFIX) {
            std::fs::remove_file(path).map_err(|e| HarnessError::io_error(path, e))?;
        }
    }
    Ok(())
}
