//! Harness configuration
//!
//! Resolved once per process from `CONFORM_*` environment variables, then
//! optionally overlaid by a TOML file. Fields a file leaves out keep their
//! environment value.

use crate::error::HarnessError;
use crate::process::ProcessRunner;
use crate::reference::ReleaseTier;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_RUN_REFERENCE: &str = "CONFORM_RUN_REFERENCE";
pub const ENV_REFERENCE_ROOTS: &str = "CONFORM_REFERENCE_ROOTS";
pub const ENV_REFERENCE_ROOT: &str = "CONFORM_REFERENCE_ROOT";
pub const ENV_OUTPUT_DIR: &str = "CONFORM_OUTPUT_DIR";
pub const ENV_PROCESS_TIMEOUT: &str = "CONFORM_PROCESS_TIMEOUT";
pub const ENV_WAIVERS: &str = "CONFORM_WAIVERS";

pub const DEFAULT_COMPLIANCE: ReleaseTier = ReleaseTier::Jdk17;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Compare against reference installations at all
    pub run_reference: bool,
    /// Reference installation roots, each holding `bin/javac` and `bin/java`
    pub reference_roots: Vec<PathBuf>,
    /// Root of per-test output, reference scratch directories and full logs
    pub output_dir: PathBuf,
    /// Per-subprocess timeout in seconds
    pub process_timeout: Option<u64>,
    /// Extra excuses loaded on top of the built-in table
    pub waiver_file: Option<PathBuf>,
    /// Platform class libraries; never handed to reference compilers
    pub platform_libraries: Vec<PathBuf>,
    /// Compliance tier the suite is written for
    pub compliance: ReleaseTier,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            run_reference: false,
            reference_roots: Vec::new(),
            output_dir: std::env::temp_dir().join("conform"),
            process_timeout: None,
            waiver_file: None,
            platform_libraries: Vec::new(),
            compliance: DEFAULT_COMPLIANCE,
        }
    }
}

/// A partial configuration as read from a TOML file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverlay {
    pub run_reference: Option<bool>,
    pub reference_roots: Option<Vec<PathBuf>>,
    pub output_dir: Option<PathBuf>,
    pub process_timeout: Option<u64>,
    pub waiver_file: Option<PathBuf>,
    pub platform_libraries: Option<Vec<PathBuf>>,
    pub compliance: Option<ReleaseTier>,
}

impl HarnessConfig {
    /// Read the `CONFORM_*` variables of this process
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`HarnessConfig::from_env`] with an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_RUN_REFERENCE) {
            config.run_reference = parse_flag(ENV_RUN_REFERENCE, &value)?;
        }
        if let Some(value) = lookup(ENV_REFERENCE_ROOTS) {
            config.reference_roots = std::env::split_paths(&value)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
        if let Some(value) = lookup(ENV_REFERENCE_ROOT).filter(|v| !v.trim().is_empty()) {
            let root = PathBuf::from(value.trim());
            if !config.reference_roots.contains(&root) {
                config.reference_roots.insert(0, root);
            }
        }
        if let Some(value) = lookup(ENV_OUTPUT_DIR).filter(|v| !v.trim().is_empty()) {
            config.output_dir = PathBuf::from(value.trim());
        }
        if let Some(value) = lookup(ENV_PROCESS_TIMEOUT) {
            let seconds = value.trim().parse::<u64>().map_err(|_| {
                HarnessError::config_error(format!(
                    "{ENV_PROCESS_TIMEOUT} must be a number of seconds, got '{value}'"
                ))
            })?;
            config.process_timeout = Some(seconds).filter(|s| *s > 0);
        }
        if let Some(value) = lookup(ENV_WAIVERS).filter(|v| !v.trim().is_empty()) {
            config.waiver_file = Some(PathBuf::from(value.trim()));
        }

        Ok(config)
    }

    /// Environment first, then `file` on top
    pub fn resolve(file: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Some(path) = file {
            config.merge(ConfigOverlay::load(path)?);
        }
        Ok(config)
    }

    pub fn merge(&mut self, overlay: ConfigOverlay) -> &mut Self {
        if let Some(run_reference) = overlay.run_reference {
            self.run_reference = run_reference;
        }
        if let Some(roots) = overlay.reference_roots {
            self.reference_roots = roots;
        }
        if let Some(output_dir) = overlay.output_dir {
            self.output_dir = output_dir;
        }
        if overlay.process_timeout.is_some() {
            self.process_timeout = overlay.process_timeout.filter(|s| *s > 0);
        }
        if overlay.waiver_file.is_some() {
            self.waiver_file = overlay.waiver_file;
        }
        if let Some(libraries) = overlay.platform_libraries {
            self.platform_libraries = libraries;
        }
        if let Some(compliance) = overlay.compliance {
            self.compliance = compliance;
        }
        self
    }

    pub fn process_timeout(&self) -> Option<Duration> {
        self.process_timeout.map(Duration::from_secs)
    }

    /// A process runner honoring the configured timeout
    pub fn runner(&self) -> ProcessRunner {
        ProcessRunner::new().with_timeout(self.process_timeout())
    }

    /// Output of the compiler under test, flushed between tests
    pub fn under_test_dir(&self) -> PathBuf {
        self.output_dir.join("under-test")
    }

    /// Scratch directory for one reference installation
    pub fn reference_dir(&self, raw_version: &str) -> PathBuf {
        self.output_dir.join("reference").join(raw_version)
    }
}

impl ConfigOverlay {
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| HarnessError::io_error(path, e))?;
        toml::from_str(&content).map_err(|e| {
            HarnessError::config_error(format!(
                "Failed to load config from '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "enabled" | "true" | "yes" | "on" | "1" => Ok(true),
        "disabled" | "false" | "no" | "off" | "0" | "" => Ok(false),
        other => Err(HarnessError::config_error(format!(
            "{name} must be enabled or disabled, got '{other}'"
        ))),
    }
}
