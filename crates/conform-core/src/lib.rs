//! Conform Core
//!
//! Differential testing of a Java compiler against reference toolchains.
//! A test compiles its sources with the compiler under test, checks the
//! problem log and program output it expects, then compiles and runs the
//! same sources with each matching reference installation. Disagreements are
//! classified, checked against versioned excuses and counted per test class.

pub mod config;
pub mod error;
pub mod inspect;
pub mod mismatch;
pub mod orchestrator;
pub mod process;
pub mod reference;
pub mod result;
pub mod stats;
pub mod under_test;
pub mod verifier;
pub mod waiver;

// Re-export commonly used types
pub use config::{ConfigOverlay, HarnessConfig};
pub use error::{ComparisonFailure, ErrorKind, HarnessError};
pub use inspect::{BytecodeInspector, ClassFileInspector, InspectError};
pub use mismatch::{ExpectedDiagnostics, MismatchKind, MismatchSet};
pub use orchestrator::{
    ExecutionSummary, ReferenceComparison, ReferenceOptions, TestCase, TestOrchestrator,
    TestOutcome,
};
pub use process::{CommandLine, ProcessError, ProcessOutput, ProcessRunner};
pub use reference::{
    CompileOutcome, ReferenceCompiler, ReferenceRegistry, ReferenceRuntime, ReferenceVersion,
    ReleaseTier, RuntimeCache, RuntimeOutcome, VersionError,
};
pub use result::{Result, ResultExt};
pub use stats::{Bucket, ClassSession, FullLog, RunStatistics};
pub use under_test::{
    CommandCompiler, CompilationResult, CompilationUnit, CompilerOptions, CompilerUnderTest,
    NameEnvironment, Problem, Requestor, Severity,
};
pub use verifier::{
    ExecutionVerifier, ProcessVerifier, ProcessVerifierFactory, VerificationOutcome,
    VerificationRequest, VerifierFactory,
};
pub use waiver::{Applicability, Excuse, Pivot, WaiverLedger, WaiverRegistry};

/// Initialize the tracing subscriber for logging
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("conform=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
