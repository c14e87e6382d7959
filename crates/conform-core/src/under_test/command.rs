//! Drives an external command as the compiler under test
//!
//! The command is given as a template. Placeholders are substituted per
//! compilation:
//!
//! - `{output}`: output directory (also the working directory)
//! - `{classpath}`: classpath entries joined with the platform separator
//! - `{options}`: path of a `name=value` properties file with the options
//! - `{files}`: the source files, one argument each
//!
//! Diagnostics are read from both output streams in the common
//! `file:line: severity: message` shape, optionally followed by the source
//! line and a caret line.

use crate::error::HarnessError;
use crate::process::{CommandLine, ProcessRunner};
use crate::under_test::{
    CompilationResult, CompilationUnit, CompilerOptions, CompilerUnderTest, NameEnvironment,
    Problem, Requestor, Severity,
};
use crate::Result;
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static DIAGNOSTIC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<file>[^:\s][^:]*):(?P<line>\d+):(?:\d+:)?\s*(?P<severity>error|warning|info|note):\s*(?P<message>.*)$",
    )
    .unwrap()
});

static CARET_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\^+\s*$").unwrap());

const OPTIONS_FILE: &str = ".conform-options.properties";

#[cfg(windows)]
const PATH_LIST_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const PATH_LIST_SEPARATOR: &str = ":";

#[derive(Debug, Clone)]
pub struct CommandCompiler {
    name: String,
    template: CommandLine,
    runner: ProcessRunner,
}

impl CommandCompiler {
    /// `template` is a command line such as `ecj -d {output} -cp {classpath} {files}`
    pub fn new(template: &str, runner: ProcessRunner) -> Result<Self> {
        let template = CommandLine::parse(template)
            .ok_or_else(|| HarnessError::config_error("compiler command is empty"))?;
        if !template.arguments().iter().any(|arg| arg.contains("{files}")) {
            return Err(HarnessError::config_error(format!(
                "compiler command '{template}' has no {{files}} placeholder"
            )));
        }
        let name = Path::new(template.program())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| template.program().to_string());
        Ok(Self {
            name,
            template,
            runner,
        })
    }

    fn expand(&self, output_dir: &Path, classpath: &[PathBuf], files: &[String]) -> CommandLine {
        let output = output_dir.to_string_lossy();
        let classpath = classpath
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(PATH_LIST_SEPARATOR);
        let options = output_dir.join(OPTIONS_FILE);
        let options = options.to_string_lossy();

        let mut command = CommandLine::new(self.template.program());
        for arg in self.template.arguments() {
            if arg == "{files}" {
                command = command.args(files.iter().cloned());
            } else {
                command = command.arg(
                    arg.replace("{output}", &output)
                        .replace("{classpath}", &classpath)
                        .replace("{options}", &options),
                );
            }
        }
        command
    }
}

#[async_trait]
impl CompilerUnderTest for CommandCompiler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn compile(
        &self,
        units: &[CompilationUnit],
        options: &CompilerOptions,
        environment: &dyn NameEnvironment,
        requestor: &mut Requestor,
    ) -> Result<()> {
        let output_dir = requestor.output_dir().to_path_buf();
        std::fs::create_dir_all(&output_dir)
            .map_err(|e| HarnessError::io_error(&output_dir, e))?;
        for unit in units {
            let path = output_dir.join(&unit.path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| HarnessError::io_error(parent, e))?;
            }
            std::fs::write(&path, &unit.contents).map_err(|e| HarnessError::io_error(&path, e))?;
        }
        let options_path = output_dir.join(OPTIONS_FILE);
        std::fs::write(&options_path, options.to_properties())
            .map_err(|e| HarnessError::io_error(&options_path, e))?;

        let files: Vec<String> = units.iter().map(|u| u.path.clone()).collect();
        let command = self.expand(&output_dir, &environment.classpath(), &files);
        let output = self.runner.run(&output_dir, &command).await?;
        debug!("{} exited with {}", self.name, output.exit_code);

        let mut problems = parse_diagnostics(&output.stderr);
        problems.extend(parse_diagnostics(&output.stdout));
        if output.exit_code != 0 && !problems.iter().any(Problem::is_error) {
            let first = output.stderr.lines().next().unwrap_or_default();
            let file_name = units.first().map(|u| u.path.clone()).unwrap_or_default();
            problems.push(Problem::error(
                file_name,
                0,
                format!("{} exited with code {}: {}", self.name, output.exit_code, first),
            ));
        }

        for result in group_by_unit(units, problems) {
            requestor.accept_result(result)?;
        }
        Ok(())
    }
}

/// Parse `file:line[:col]: severity: message` lines with optional source and
/// caret lines following each
pub fn parse_diagnostics(text: &str) -> Vec<Problem> {
    let lines: Vec<&str> = text.lines().collect();
    let mut problems = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let Some(captures) = DIAGNOSTIC_LINE.captures(lines[i]) else {
            i += 1;
            continue;
        };
        let severity = match &captures["severity"] {
            "error" => Severity::Error,
            "warning" => Severity::Warning,
            _ => Severity::Info,
        };
        let line = captures["line"].parse().unwrap_or(0);
        let mut problem = Problem::new(
            severity,
            captures["file"].replace('\\', "/"),
            line,
            captures["message"].trim(),
        );
        i += 1;

        if i + 1 < lines.len()
            && !DIAGNOSTIC_LINE.is_match(lines[i])
            && CARET_LINE.is_match(lines[i + 1])
        {
            let caret_line = lines[i + 1];
            let start = caret_line.find('^').unwrap_or(0);
            let end = caret_line.rfind('^').unwrap_or(start);
            problem = problem.with_source(lines[i], start, end);
            i += 2;
        }
        problems.push(problem);
    }
    problems
}

/// One result per unit, in unit order; problems naming unknown files go to
/// the first unit
fn group_by_unit(units: &[CompilationUnit], problems: Vec<Problem>) -> Vec<CompilationResult> {
    let mut results: Vec<CompilationResult> = units
        .iter()
        .map(|u| CompilationResult::new(u.path.clone()))
        .collect();
    for problem in problems {
        let index = units
            .iter()
            .position(|u| u.path == problem.file_name || problem.file_name.ends_with(&u.path))
            .unwrap_or(0);
        if let Some(result) = results.get_mut(index) {
            result.problems.push(problem);
        }
    }
    results
}
