//! Subprocess launching with concurrent output draining
//!
//! Every launched process gets two [`StreamDrain`] tasks, one on stdout and one
//! on stderr, started before the runner waits for exit. A child that writes
//! more than the OS pipe buffer holds would otherwise block forever on its
//! next write while the parent blocks on `wait`.
//!
//! Buffers are only exposed once the exit status is known *and* both drains
//! have been joined: a drain may still be copying bytes after the OS reports
//! the process has exited.

use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Environment variables removed from every child; JVM launchers echo them to
/// stderr, which would read as diagnostics.
const SCRUBBED_ENV: &[&str] = &["JAVA_TOOL_OPTIONS", "_JAVA_OPTIONS"];

/// Subprocess failures
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The process could not be started at all
    #[error("could not launch '{program}': {source}")]
    Unlaunchable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process started but waiting for it or collecting its output failed
    #[error("'{program}' was aborted: {reason}")]
    Aborted { program: String, reason: String },
}

impl ProcessError {
    pub fn is_unlaunchable(&self) -> bool {
        matches!(self, ProcessError::Unlaunchable { .. })
    }
}

/// A program plus its argument vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Split a whitespace separated command line. Double quotes group
    /// whitespace into a single token and are dropped from the result.
    /// Returns `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = split_tokens(line).into_iter();
        let program = tokens.next()?;
        Some(Self {
            program,
            args: tokens.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Split on unquoted whitespace, removing the quotes themselves
pub fn split_tokens(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut pending = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                pending = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if pending {
                    tokens.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        tokens.push(current);
    }
    tokens
}

/// Everything a finished process produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Continuously reads one stream until EOF, line by line
///
/// Each line is stored with a trailing `\n` whatever terminator the child used.
pub struct StreamDrain {
    handle: JoinHandle<std::io::Result<String>>,
}

impl StreamDrain {
    /// Start draining `reader` on a dedicated task
    pub fn spawn<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut buffer = String::new();
            let mut line = Vec::new();
            loop {
                line.clear();
                if reader.read_until(b'\n', &mut line).await? == 0 {
                    break;
                }
                while matches!(line.last(), Some(b'\n' | b'\r')) {
                    line.pop();
                }
                buffer.push_str(&String::from_utf8_lossy(&line));
                buffer.push('\n');
            }
            Ok(buffer)
        });
        Self { handle }
    }

    /// Wait for end of stream and hand back everything read
    pub async fn join(self) -> std::io::Result<String> {
        match self.handle.await {
            Ok(result) => result,
            Err(join_error) => Err(std::io::Error::other(join_error)),
        }
    }
}

/// Launches subprocesses and collects their output
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort processes that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `command` in `work_dir` to completion
    ///
    /// The child is spawned with `kill_on_drop`, so every early return below
    /// (and any panic unwinding through here) releases the process.
    pub async fn run(
        &self,
        work_dir: &Path,
        command: &CommandLine,
    ) -> Result<ProcessOutput, ProcessError> {
        let program = command.program().to_string();
        debug!("Launching `{}` in {}", command, work_dir.display());

        let mut cmd = Command::new(command.program());
        cmd.args(command.arguments())
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for var in SCRUBBED_ENV {
            cmd.env_remove(var);
        }

        let mut child = cmd.spawn().map_err(|source| ProcessError::Unlaunchable {
            program: program.clone(),
            source,
        })?;

        let stdout = child.stdout.take().ok_or_else(|| ProcessError::Aborted {
            program: program.clone(),
            reason: "stdout was not captured".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| ProcessError::Aborted {
            program: program.clone(),
            reason: "stderr was not captured".to_string(),
        })?;
        let stdout_drain = StreamDrain::spawn(stdout);
        let stderr_drain = StreamDrain::spawn(stderr);

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    warn!("`{}` exceeded {:?}, killing it", program, limit);
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill `{}`: {}", program, e);
                    }
                    return Err(ProcessError::Aborted {
                        program,
                        reason: format!("timed out after {limit:?}"),
                    });
                }
            },
            None => child.wait().await,
        };
        let status = waited.map_err(|e| ProcessError::Aborted {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        // Both joins must complete before either buffer is read.
        let stdout = stdout_drain.join().await;
        let stderr = stderr_drain.join().await;
        let (stdout, stderr) = match (stdout, stderr) {
            (Ok(out), Ok(err)) => (out, err),
            (Err(e), _) | (_, Err(e)) => {
                return Err(ProcessError::Aborted {
                    program,
                    reason: format!("output drain failed: {e}"),
                });
            }
        };

        let exit_code = exit_code(status);
        debug!("`{}` exited with {}", program, exit_code);
        Ok(ProcessOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_tokens_honors_quotes() {
        assert_eq!(
            split_tokens(r#"javac -classpath "a b.jar" X.java"#),
            vec!["javac", "-classpath", "a b.jar", "X.java"]
        );
        assert_eq!(split_tokens("  a   b "), vec!["a", "b"]);
        assert_eq!(split_tokens(r#"-d """#), vec!["-d", ""]);
        assert!(CommandLine::parse("   ").is_none());
    }

    #[test]
    fn test_command_line_display() {
        let cmd = CommandLine::new("java").args(["-classpath", "."]).arg("X");
        assert_eq!(cmd.to_string(), "java -classpath . X");
    }

    #[tokio::test]
    async fn test_unlaunchable_is_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProcessRunner::new()
            .run(dir.path(), &CommandLine::new("/definitely/not/a/real/binary"))
            .await
            .unwrap_err();
        assert!(err.is_unlaunchable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_both_streams_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = CommandLine::new("sh")
            .arg("-c")
            .arg("echo out; echo err 1>&2; printf 'no newline'; exit 3");
        let output = ProcessRunner::new().run(dir.path(), &cmd).await.unwrap();

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout, "out\nno newline\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_stderr_is_drained_in_full() {
        // Well past the 64KB pipe buffer; without concurrent draining the
        // child blocks on write and never exits.
        let dir = tempfile::tempdir().unwrap();
        let line = "x".repeat(99);
        let script = format!(
            "i=0; while [ $i -lt 2000 ]; do echo {line} 1>&2; i=$((i+1)); done; echo done"
        );
        let cmd = CommandLine::new("sh").arg("-c").arg(script);
        let output = ProcessRunner::new()
            .with_timeout(Some(Duration::from_secs(60)))
            .run(dir.path(), &cmd)
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stderr.len(), 2000 * 100);
        assert_eq!(output.stderr.lines().count(), 2000);
        assert_eq!(output.stdout, "done\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = CommandLine::new("sh").arg("-c").arg("sleep 5");
        let err = ProcessRunner::new()
            .with_timeout(Some(Duration::from_millis(100)))
            .run(dir.path(), &cmd)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Aborted { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let cmd = CommandLine::new("sh").arg("-c").arg("cat marker.txt");
        let output = ProcessRunner::new().run(dir.path(), &cmd).await.unwrap();
        assert_eq!(output.stdout, "here\n");
    }
}
