//! Conform Integration Tests
//!
//! Fixtures for driving the orchestrator end to end: reference installations
//! made of shell scripts, and a compiler under test and verifier that report
//! whatever they were told to.

#[cfg(unix)]
pub mod fake_jdk;
pub mod scripted;

#[cfg(unix)]
pub use fake_jdk::{FakeJdk, FakeJdkBuilder};
pub use scripted::{expected_log, ScriptedCompiler, ScriptedVerifierFactory, VerifierCounters};

use conform_core::HarnessConfig;
use std::path::Path;

/// Configuration writing everything below `output_dir`
pub fn test_config(output_dir: &Path, run_reference: bool) -> HarnessConfig {
    HarnessConfig {
        run_reference,
        output_dir: output_dir.to_path_buf(),
        process_timeout: Some(30),
        ..HarnessConfig::default()
    }
}
