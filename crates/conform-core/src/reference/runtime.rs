//! Reference runtimes paired with reference compilers

use crate::process::{split_tokens, CommandLine, ProcessError, ProcessRunner};
use crate::reference::compiler::resolve_executable;
use crate::reference::{ReferenceCompiler, ReferenceVersion};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

#[cfg(windows)]
pub const RUNTIME_NAME: &str = "java.exe";
#[cfg(not(windows))]
pub const RUNTIME_NAME: &str = "java";

/// Captured result of running a compiled program
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// The runtime shipped in a reference installation
#[derive(Debug, Clone)]
pub struct ReferenceRuntime {
    root: PathBuf,
    executable: PathBuf,
    version: ReferenceVersion,
    runner: ProcessRunner,
}

impl ReferenceRuntime {
    pub fn for_compiler(compiler: &ReferenceCompiler) -> Self {
        Self {
            root: compiler.root().to_path_buf(),
            executable: resolve_executable(compiler.root(), RUNTIME_NAME),
            version: compiler.version().clone(),
            runner: compiler.runner().clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn raw_version(&self) -> &str {
        &self.version.raw
    }

    /// `<exe> -classpath . <options> <entry point>`; the default classpath is
    /// left out when `options` already carry `-cp `
    pub fn command_line(&self, options: &str, entry_point: &str) -> CommandLine {
        let mut command = CommandLine::new(self.executable.to_string_lossy());
        if !options.contains("-cp ") {
            command = command.arg("-classpath").arg(".");
        }
        command.args(split_tokens(options)).arg(entry_point)
    }

    pub async fn execute(
        &self,
        work_dir: &Path,
        options: &str,
        entry_point: &str,
    ) -> Result<RuntimeOutcome, ProcessError> {
        let command = self.command_line(options, entry_point);
        let output = self.runner.run(work_dir, &command).await?;
        Ok(RuntimeOutcome {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Process-wide runtime cache keyed by raw version
#[derive(Debug, Default)]
pub struct RuntimeCache {
    runtimes: DashMap<String, Arc<ReferenceRuntime>>,
}

impl RuntimeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static RuntimeCache {
        static CACHE: OnceLock<RuntimeCache> = OnceLock::new();
        CACHE.get_or_init(RuntimeCache::new)
    }

    /// Lazily build the runtime paired with `compiler`
    pub fn runtime_for(&self, compiler: &ReferenceCompiler) -> Arc<ReferenceRuntime> {
        let entry = self
            .runtimes
            .entry(compiler.raw_version().to_string())
            .or_insert_with(|| Arc::new(ReferenceRuntime::for_compiler(compiler)));
        Arc::clone(entry.value())
    }

    pub fn len(&self) -> usize {
        self.runtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiler(root: &str, raw: &str) -> ReferenceCompiler {
        ReferenceCompiler::with_raw_version(root, raw, ProcessRunner::new()).unwrap()
    }

    #[test]
    fn test_runtime_cached_by_raw_version() {
        let cache = RuntimeCache::new();
        let first = cache.runtime_for(&compiler("/opt/jdk8", "1.8.0_131"));
        let again = cache.runtime_for(&compiler("/opt/jdk8", "1.8.0_131"));
        let other = cache.runtime_for(&compiler("/opt/jdk17", "17.0.2"));

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(cache.len(), 2);
        assert!(first.executable().ends_with(Path::new("bin").join(RUNTIME_NAME)));
    }

    #[test]
    fn test_default_classpath_unless_cp_given() {
        let runtime = ReferenceRuntime::for_compiler(&compiler("/opt/jdk17", "17"));

        let command = runtime.command_line("-Xmx64m", "p.X");
        assert_eq!(command.arguments(), &["-classpath", ".", "-Xmx64m", "p.X"]);

        let command = runtime.command_line("-cp lib:. -ea", "X");
        assert_eq!(command.arguments(), &["-cp", "lib:.", "-ea", "X"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_captures_output() {
        use std::os::unix::fs::PermissionsExt;
        let root = tempfile::tempdir().unwrap();
        let bin = root.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let exe = bin.join(RUNTIME_NAME);
        std::fs::write(&exe, "#!/bin/sh\nfor a; do last=$a; done\necho \"ran $last\"\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runtime = ReferenceRuntime::for_compiler(&compiler(
            root.path().to_str().unwrap(),
            "11",
        ));
        let outcome = runtime.execute(root.path(), "", "p.Main").await.unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.stdout, "ran p.Main\n");
        assert!(outcome.stderr.is_empty());
    }
}
