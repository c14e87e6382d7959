//! In-process stand-ins for the compiler under test and the verifier

use async_trait::async_trait;
use conform_core::verifier::check_outputs;
use conform_core::{
    CompilationResult, CompilationUnit, CompilerOptions, CompilerUnderTest, ExecutionVerifier,
    NameEnvironment, Problem, Requestor, VerificationOutcome, VerificationRequest,
    VerifierFactory,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Placeholder bytes written for every unit compiled without errors
const CLASS_FILE_STUB: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

/// Reports the configured problems for each unit
#[derive(Debug, Default)]
pub struct ScriptedCompiler {
    problems: Vec<Problem>,
    seen_options: Mutex<Vec<CompilerOptions>>,
    calls: AtomicUsize,
}

impl ScriptedCompiler {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn with_problem(mut self, problem: Problem) -> Self {
        self.problems.push(problem);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Options of every compilation so far
    pub fn seen_options(&self) -> Vec<CompilerOptions> {
        self.seen_options
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompilerUnderTest for ScriptedCompiler {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn compile(
        &self,
        units: &[CompilationUnit],
        options: &CompilerOptions,
        _environment: &dyn NameEnvironment,
        requestor: &mut Requestor,
    ) -> conform_core::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen_options.lock() {
            seen.push(options.clone());
        }
        for unit in units {
            let mut result = CompilationResult::new(&unit.path);
            for problem in self.problems.iter().filter(|p| p.file_name == unit.path) {
                result = result.with_problem(problem.clone());
            }
            if !result.has_errors() {
                let class_file = format!("{}.class", unit.type_name().replace('.', "/"));
                result = result.with_class_file(class_file, CLASS_FILE_STUB.to_vec());
            }
            requestor.accept_result(result)?;
        }
        Ok(())
    }
}

/// The log a [`Requestor`] renders for `problems` reported on one unit
pub fn expected_log(file_name: &str, problems: &[Problem]) -> conform_core::Result<String> {
    let mut requestor = Requestor::new(std::env::temp_dir(), false);
    let mut result = CompilationResult::new(file_name);
    for problem in problems {
        result = result.with_problem(problem.clone());
    }
    requestor.accept_result(result)?;
    Ok(requestor.problem_log().to_string())
}

/// Shared view on what the verifiers of one factory did
#[derive(Debug, Clone, Default)]
pub struct VerifierCounters {
    created: Arc<AtomicUsize>,
    runs: Arc<AtomicUsize>,
    shut_down: Arc<AtomicUsize>,
    vm_arguments: Arc<Mutex<Vec<Vec<String>>>>,
}

impl VerifierCounters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn shut_down(&self) -> usize {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// VM arguments each verifier was created with
    pub fn vm_arguments(&self) -> Vec<Vec<String>> {
        self.vm_arguments
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }
}

/// Creates verifiers that "run" programs by printing fixed output
#[derive(Debug, Clone, Default)]
pub struct ScriptedVerifierFactory {
    stdout: String,
    stderr: String,
    counters: VerifierCounters,
}

impl ScriptedVerifierFactory {
    pub fn printing(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            counters: VerifierCounters::default(),
        }
    }

    pub fn counters(&self) -> VerifierCounters {
        self.counters.clone()
    }
}

impl VerifierFactory for ScriptedVerifierFactory {
    fn create(&self, vm_arguments: &[String]) -> Box<dyn ExecutionVerifier> {
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.counters.vm_arguments.lock() {
            seen.push(vm_arguments.to_vec());
        }
        Box::new(ScriptedVerifier {
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            counters: self.counters.clone(),
        })
    }
}

struct ScriptedVerifier {
    stdout: String,
    stderr: String,
    counters: VerifierCounters,
}

#[async_trait]
impl ExecutionVerifier for ScriptedVerifier {
    async fn verify(
        &mut self,
        request: &VerificationRequest,
    ) -> conform_core::Result<VerificationOutcome> {
        self.counters.runs.fetch_add(1, Ordering::SeqCst);
        let outcome = match check_outputs(
            request.expected_stdout.as_deref(),
            request.expected_stderr.as_deref(),
            &self.stdout,
            &self.stderr,
        ) {
            Some(reason) => {
                VerificationOutcome::failed(reason, self.stdout.clone(), self.stderr.clone())
            }
            None => VerificationOutcome::passed(self.stdout.clone(), self.stderr.clone()),
        };
        Ok(outcome)
    }

    async fn shut_down(&mut self) {
        self.counters.shut_down.fetch_add(1, Ordering::SeqCst);
    }
}
