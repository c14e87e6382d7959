//! Reference compiler installations
//!
//! A [`ReferenceCompiler`] wraps one installation root. Its identity is the
//! pair (root, raw version); tier and minor are derived from the raw version
//! at construction and an unknown version fails construction outright.

use crate::process::{split_tokens, CommandLine, ProcessError, ProcessRunner};
use crate::reference::version::ReferenceVersion;
use crate::reference::ReleaseTier;
use crate::Result;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

#[cfg(windows)]
pub const COMPILER_NAME: &str = "javac.exe";
#[cfg(not(windows))]
pub const COMPILER_NAME: &str = "javac";

/// Low word of a packed compile result: the process exit code
pub const EXIT_VALUE_MASK: u64 = 0x0000_0000_FFFF_FFFF;
/// High word of a packed compile result: non-zero iff stderr had content
pub const ERROR_LOG_MASK: u64 = 0xFFFF_FFFF_0000_0000;
const ERROR_LOG_FLAG: u64 = 1 << 32;

const DEFAULT_PATH_OPTION: &str = "-classpath";

/// Result of one reference compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutcome {
    packed: u64,
    diagnostics: String,
}

impl CompileOutcome {
    pub fn new(exit_code: i32, diagnostics: impl Into<String>) -> Self {
        let diagnostics = diagnostics.into();
        let mut packed = u64::from(exit_code as u32);
        if !diagnostics.is_empty() {
            packed |= ERROR_LOG_FLAG;
        }
        Self {
            packed,
            diagnostics,
        }
    }

    /// Exit code in the low 32 bits, stderr flag at bit 32
    pub fn packed(&self) -> u64 {
        self.packed
    }

    pub fn exit_code(&self) -> i32 {
        (self.packed & EXIT_VALUE_MASK) as u32 as i32
    }

    pub fn failed(&self) -> bool {
        self.packed & EXIT_VALUE_MASK != 0
    }

    pub fn has_error_log(&self) -> bool {
        self.packed & ERROR_LOG_MASK != 0
    }

    /// Exit code zero and nothing on stderr
    pub fn is_clean(&self) -> bool {
        self.packed == 0
    }

    /// Everything the compiler wrote to stderr
    pub fn diagnostics(&self) -> &str {
        &self.diagnostics
    }
}

/// One reference compiler installation
#[derive(Debug, Clone)]
pub struct ReferenceCompiler {
    root: PathBuf,
    executable: PathBuf,
    version: ReferenceVersion,
    path_option: String,
    runner: ProcessRunner,
}

impl ReferenceCompiler {
    /// Resolve the installation and query its version with `-version`
    pub async fn probe(root: impl AsRef<Path>, runner: ProcessRunner) -> Result<Self> {
        let root = root.as_ref();
        let executable = resolve_executable(root, COMPILER_NAME);
        let raw = query_raw_version(&runner, root, &executable).await?;
        Self::from_parts(root, executable, &raw, runner)
    }

    /// Build from an already known raw version, without launching anything
    pub fn with_raw_version(
        root: impl AsRef<Path>,
        raw_version: &str,
        runner: ProcessRunner,
    ) -> Result<Self> {
        let root = root.as_ref();
        let executable = resolve_executable(root, COMPILER_NAME);
        Self::from_parts(root, executable, raw_version, runner)
    }

    fn from_parts(
        root: &Path,
        executable: PathBuf,
        raw_version: &str,
        runner: ProcessRunner,
    ) -> Result<Self> {
        let hint = executable.to_string_lossy();
        let version = ReferenceVersion::parse(raw_version, Some(&hint))?;
        debug!(
            "Reference compiler {} is {} (tier {}, minor {})",
            executable.display(),
            version.raw,
            version.tier,
            version.minor
        );
        Ok(Self {
            root: root.to_path_buf(),
            executable,
            version,
            path_option: DEFAULT_PATH_OPTION.to_string(),
            runner,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn version(&self) -> &ReferenceVersion {
        &self.version
    }

    pub fn raw_version(&self) -> &str {
        &self.version.raw
    }

    pub fn tier(&self) -> ReleaseTier {
        self.version.tier
    }

    pub fn minor(&self) -> u32 {
        self.version.minor
    }

    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    /// Replace the `-classpath` token placed before the default `.` entry
    pub fn use_path_option(&mut self, option: impl Into<String>) {
        self.path_option = option.into().trim().to_string();
    }

    /// `<exe> -classpath . <options> <files...>`
    pub fn command_line(&self, options: &str, source_file_names: &[String]) -> CommandLine {
        CommandLine::new(self.executable.to_string_lossy())
            .arg(self.path_option.clone())
            .arg(".")
            .args(option_tokens(options))
            .args(source_file_names.iter().cloned())
    }

    /// Compile `source_file_names` inside `work_dir`, creating it if needed
    pub async fn compile(
        &self,
        work_dir: &Path,
        options: &str,
        source_file_names: &[String],
    ) -> std::result::Result<CompileOutcome, ProcessError> {
        if !work_dir.exists() {
            std::fs::create_dir_all(work_dir).map_err(|source| ProcessError::Unlaunchable {
                program: self.executable.to_string_lossy().into_owned(),
                source,
            })?;
        }
        let command = self.command_line(options, source_file_names);
        let output = self.runner.run(work_dir, &command).await?;
        if !output.stderr.is_empty() {
            debug!("--- reference compiler err: ---\n{}", output.stderr);
        }
        Ok(CompileOutcome::new(output.exit_code, output.stderr))
    }
}

/// Option strings arrive as single command-line fragments. On Linux double
/// quotes are stripped before splitting, elsewhere they group tokens.
fn option_tokens(options: &str) -> Vec<String> {
    if cfg!(target_os = "linux") {
        options
            .replace('"', "")
            .split_whitespace()
            .map(str::to_string)
            .collect()
    } else {
        split_tokens(options)
    }
}

pub(crate) fn resolve_executable(root: &Path, name: &str) -> PathBuf {
    let path = root.join("bin").join(name);
    std::fs::canonicalize(&path).unwrap_or(path)
}

/// First line of stderr (older toolchains) or stdout (newer ones), minus the
/// `javac ` prefix
async fn query_raw_version(
    runner: &ProcessRunner,
    root: &Path,
    executable: &Path,
) -> std::result::Result<String, ProcessError> {
    let command = CommandLine::new(executable.to_string_lossy()).arg("-version");
    let work_dir = if root.is_dir() { root } else { Path::new(".") };
    let output = runner.run(work_dir, &command).await?;
    let logged = if output.stderr.is_empty() {
        output.stdout
    } else {
        output.stderr
    };
    let first_line = logged.lines().next().unwrap_or_default();
    Ok(first_line
        .strip_prefix("javac ")
        .unwrap_or(first_line)
        .trim()
        .to_string())
}

/// Process-wide reference compiler cache
///
/// Installations are probed once per run; later lookups by root or raw
/// version reuse the same instance.
#[derive(Debug, Default)]
pub struct ReferenceRegistry {
    by_root: DashMap<PathBuf, Arc<ReferenceCompiler>>,
    by_version: DashMap<String, Arc<ReferenceCompiler>>,
}

impl ReferenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static ReferenceRegistry {
        static REGISTRY: OnceLock<ReferenceRegistry> = OnceLock::new();
        REGISTRY.get_or_init(ReferenceRegistry::new)
    }

    /// Probe each root not seen before; returns installations in root order
    ///
    /// Two roots reporting the same raw version would share a scratch
    /// directory, so only the first one is kept.
    pub async fn resolve(
        &self,
        roots: &[PathBuf],
        runner: &ProcessRunner,
    ) -> Result<Vec<Arc<ReferenceCompiler>>> {
        let mut compilers: Vec<Arc<ReferenceCompiler>> = Vec::with_capacity(roots.len());
        for root in roots {
            let cached = self.by_root.get(root).map(|entry| Arc::clone(entry.value()));
            let compiler = match cached {
                Some(compiler) => compiler,
                None => {
                    let probed = Arc::new(ReferenceCompiler::probe(root, runner.clone()).await?);
                    info!(
                        "Reference installation {} reports {}",
                        root.display(),
                        probed.raw_version()
                    );
                    self.insert(root, probed)
                }
            };
            if compilers
                .iter()
                .any(|c| c.raw_version() == compiler.raw_version())
            {
                warn!(
                    "Skipping {}: version {} is already configured",
                    root.display(),
                    compiler.raw_version()
                );
                continue;
            }
            compilers.push(compiler);
        }
        Ok(compilers)
    }

    /// Register an installation; an existing entry for the same raw version wins
    pub fn insert(&self, root: &Path, compiler: Arc<ReferenceCompiler>) -> Arc<ReferenceCompiler> {
        let shared = Arc::clone(
            self.by_version
                .entry(compiler.raw_version().to_string())
                .or_insert(compiler)
                .value(),
        );
        self.by_root.insert(root.to_path_buf(), Arc::clone(&shared));
        shared
    }

    pub fn get(&self, raw_version: &str) -> Option<Arc<ReferenceCompiler>> {
        self.by_version
            .get(raw_version)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.by_version.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_version.is_empty()
    }
}
