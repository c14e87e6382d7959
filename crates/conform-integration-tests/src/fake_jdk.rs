//! Reference installations made of `bin/javac` and `bin/java` shell scripts
//!
//! The compiler answers `-version` with the configured version and otherwise
//! prints the configured diagnostics. The runtime prints the configured
//! output. Both append their arguments to `<root>/<tool>.args`.

use conform_core::{ProcessRunner, ReferenceCompiler};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub struct FakeJdkBuilder {
    raw_version: String,
    version_on_stdout: bool,
    compile_exit: i32,
    compile_stderr: String,
    compile_stderr_bytes: usize,
    compile_sleep: Option<u32>,
    run_stdout: String,
    run_stderr: String,
    with_runtime: bool,
}

impl FakeJdkBuilder {
    /// Newer toolchains print the version on stdout
    pub fn version_on_stdout(mut self) -> Self {
        self.version_on_stdout = true;
        self
    }

    /// Compilation exits with `code` and prints `stderr`
    pub fn compile_result(mut self, code: i32, stderr: impl Into<String>) -> Self {
        self.compile_exit = code;
        self.compile_stderr = stderr.into();
        self
    }

    /// Compilation floods stderr with `bytes` bytes
    pub fn compile_stderr_bytes(mut self, bytes: usize) -> Self {
        self.compile_stderr_bytes = bytes;
        self
    }

    pub fn compile_sleep(mut self, seconds: u32) -> Self {
        self.compile_sleep = Some(seconds);
        self
    }

    pub fn run_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.run_stdout = stdout.into();
        self.run_stderr = stderr.into();
        self
    }

    /// Leave `bin/java` out
    pub fn without_runtime(mut self) -> Self {
        self.with_runtime = false;
        self
    }

    pub fn build(self) -> anyhow::Result<FakeJdk> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();

        let version_redirect = if self.version_on_stdout { "" } else { " >&2" };
        let mut javac = format!(
            "if [ \"$1\" = \"-version\" ]; then\n  echo 'javac {}'{}\n  exit 0\nfi\n",
            self.raw_version, version_redirect
        );
        javac.push_str(&record_arguments(root, "javac"));
        if let Some(seconds) = self.compile_sleep {
            javac.push_str(&format!("sleep {seconds}\n"));
        }
        javac.push_str(&emit(&self.compile_stderr, true));
        if self.compile_stderr_bytes > 0 {
            javac.push_str(&format!(
                "head -c {} /dev/zero | tr '\\0' 'x' >&2\n",
                self.compile_stderr_bytes
            ));
        }
        javac.push_str(&format!("exit {}\n", self.compile_exit));
        write_script(&root.join("bin").join("javac"), &javac)?;

        if self.with_runtime {
            let mut java = record_arguments(root, "java");
            java.push_str(&emit(&self.run_stdout, false));
            java.push_str(&emit(&self.run_stderr, true));
            write_script(&root.join("bin").join("java"), &java)?;
        }

        Ok(FakeJdk {
            dir,
            raw_version: self.raw_version,
        })
    }
}

fn record_arguments(root: &Path, tool: &str) -> String {
    format!("echo \"$@\" >> '{}'\n", root.join(format!("{tool}.args")).display())
}

fn emit(text: &str, to_stderr: bool) -> String {
    if text.is_empty() {
        return String::new();
    }
    let redirect = if to_stderr { " >&2" } else { "" };
    format!("cat{redirect} <<'CONFORM_EOF'\n{text}\nCONFORM_EOF\n")
}

fn write_script(path: &Path, body: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("#!/bin/sh\n{body}"))?;
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions)
}

pub struct FakeJdk {
    dir: TempDir,
    raw_version: String,
}

impl FakeJdk {
    /// A clean compiler and a silent runtime reporting `raw_version`
    pub fn builder(raw_version: impl Into<String>) -> FakeJdkBuilder {
        FakeJdkBuilder {
            raw_version: raw_version.into(),
            version_on_stdout: false,
            compile_exit: 0,
            compile_stderr: String::new(),
            compile_stderr_bytes: 0,
            compile_sleep: None,
            run_stdout: String::new(),
            run_stderr: String::new(),
            with_runtime: true,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn raw_version(&self) -> &str {
        &self.raw_version
    }

    /// Probe the installation the way the harness does
    pub async fn probe(&self, runner: ProcessRunner) -> conform_core::Result<Arc<ReferenceCompiler>> {
        Ok(Arc::new(ReferenceCompiler::probe(self.root(), runner).await?))
    }

    /// One line per compiler launch, version queries excluded
    pub fn compiler_calls(&self) -> Vec<String> {
        read_lines(&self.root().join("javac.args"))
    }

    pub fn runtime_calls(&self) -> Vec<String> {
        read_lines(&self.root().join("java.args"))
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|content| content.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
