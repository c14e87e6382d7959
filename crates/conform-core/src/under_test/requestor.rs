//! Collects compilation results from the compiler under test
//!
//! The [`Requestor`] receives one [`CompilationResult`] per compilation unit,
//! keeps track of whether any error was reported, renders the problem log
//! tests compare against, and optionally writes produced class files.

use crate::error::HarnessError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

const PROBLEM_SEPARATOR: &str = "----------\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

/// One reported problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub severity: Severity,
    /// Originating file, relative to the source root
    pub file_name: String,
    /// 1-based
    pub line: u32,
    pub message: String,
    /// Text of the offending line, if known
    #[serde(default)]
    pub source_line: Option<String>,
    /// 0-based inclusive column range within `source_line`
    #[serde(default)]
    pub columns: Option<(usize, usize)>,
    #[serde(default)]
    pub category: Option<String>,
    /// Suppression token that silences this problem
    #[serde(default)]
    pub warning_token: Option<String>,
}

impl Problem {
    pub fn new(
        severity: Severity,
        file_name: impl Into<String>,
        line: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            file_name: file_name.into(),
            line,
            message: message.into(),
            source_line: None,
            columns: None,
            category: None,
            warning_token: None,
        }
    }

    pub fn error(file_name: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, file_name, line, message)
    }

    pub fn warning(file_name: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, file_name, line, message)
    }

    pub fn with_source(mut self, source_line: impl Into<String>, start: usize, end: usize) -> Self {
        self.source_line = Some(source_line.into());
        self.columns = Some((start, end));
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_warning_token(mut self, token: impl Into<String>) -> Self {
        self.warning_token = Some(token.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// ` (at line N)` plus the source excerpt with a caret underline.
    /// Leading whitespace of the excerpt is dropped and the carets shift with it.
    fn report_source(&self) -> String {
        let mut out = format!(" (at line {})", self.line);
        if let Some(source) = &self.source_line {
            let trimmed = source.trim_start();
            let shift = source.chars().count() - trimmed.chars().count();
            out.push_str("\n\t");
            out.push_str(trimmed.trim_end());
            if let Some((start, end)) = self.columns {
                let start = start.saturating_sub(shift);
                let width = end.saturating_sub(shift).saturating_sub(start) + 1;
                out.push_str("\n\t");
                out.push_str(&" ".repeat(start));
                out.push_str(&"^".repeat(width));
            }
        }
        out
    }
}

/// A produced class file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    /// Path relative to the output directory, e.g. `p/X.class`
    pub relative_path: String,
    pub bytes: Vec<u8>,
}

/// What the compiler under test produced for one compilation unit
#[derive(Debug, Clone, Default)]
pub struct CompilationResult {
    pub file_name: String,
    pub problems: Vec<Problem>,
    pub class_files: Vec<ClassFile>,
}

impl CompilationResult {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Self::default()
        }
    }

    pub fn with_problem(mut self, problem: Problem) -> Self {
        self.problems.push(problem);
        self
    }

    pub fn with_class_file(mut self, relative_path: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.class_files.push(ClassFile {
            relative_path: relative_path.into(),
            bytes,
        });
        self
    }

    pub fn has_errors(&self) -> bool {
        self.problems.iter().any(Problem::is_error)
    }
}

/// Caller-supplied observer for every reported problem
pub trait DiagnosticSink: Send {
    fn accept(&mut self, problem: &Problem);
}

impl<F> DiagnosticSink for F
where
    F: FnMut(&Problem) + Send,
{
    fn accept(&mut self, problem: &Problem) {
        self(problem)
    }
}

pub struct Requestor {
    output_dir: PathBuf,
    generate_output: bool,
    show_category: bool,
    show_warning_token: bool,
    sink: Option<Box<dyn DiagnosticSink>>,
    has_errors: bool,
    problem_log: String,
    written: Vec<PathBuf>,
}

impl fmt::Debug for Requestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Requestor")
            .field("output_dir", &self.output_dir)
            .field("generate_output", &self.generate_output)
            .field("has_errors", &self.has_errors)
            .finish_non_exhaustive()
    }
}

impl Requestor {
    pub fn new(output_dir: impl Into<PathBuf>, generate_output: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            generate_output,
            show_category: false,
            show_warning_token: false,
            sink: None,
            has_errors: false,
            problem_log: String::new(),
            written: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn show_category(mut self, show: bool) -> Self {
        self.show_category = show;
        self
    }

    pub fn show_warning_token(mut self, show: bool) -> Self {
        self.show_warning_token = show;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    /// Rendered problems of every accepted result, in acceptance order
    pub fn problem_log(&self) -> &str {
        &self.problem_log
    }

    pub fn class_files_written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn accept_result(&mut self, result: CompilationResult) -> Result<()> {
        if result.has_errors() {
            self.has_errors = true;
        }
        if let Some(sink) = self.sink.as_mut() {
            for problem in &result.problems {
                sink.accept(problem);
            }
        }
        self.problem_log.push_str(&self.render(&result.problems));

        if self.generate_output {
            for class_file in &result.class_files {
                let path = self.output_dir.join(&class_file.relative_path);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| HarnessError::io_error(parent, e))?;
                }
                std::fs::write(&path, &class_file.bytes)
                    .map_err(|e| HarnessError::io_error(&path, e))?;
                debug!("Wrote {}", path.display());
                self.written.push(path);
            }
        }
        Ok(())
    }

    /// Problems numbered from 1 per compilation unit, each block closed by a
    /// separator line. File names use `\` as the separator.
    fn render(&self, problems: &[Problem]) -> String {
        let mut buffer = String::new();
        for (index, problem) in problems.iter().enumerate() {
            if index == 0 {
                buffer.push_str(PROBLEM_SEPARATOR);
            }
            buffer.push_str(&format!(
                "{}. {} in {}",
                index + 1,
                problem.severity,
                problem.file_name.replace('/', "\\")
            ));
            buffer.push_str(&problem.report_source());
            buffer.push('\n');
            if self.show_category {
                if let Some(category) = &problem.category {
                    buffer.push_str(&format!("[@cat:{category}] "));
                }
            }
            if self.show_warning_token {
                if let Some(token) = &problem.warning_token {
                    buffer.push_str(&format!("[@sup:{token}] "));
                }
            }
            buffer.push_str(&problem.message);
            buffer.push('\n');
            buffer.push_str(PROBLEM_SEPARATOR);
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn zork() -> Problem {
        Problem::error("p/X.java", 3, "Zork cannot be resolved to a type")
            .with_source("\t\tZork z;", 2, 5)
            .with_category("Type")
    }

    #[test]
    fn test_problem_log_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let mut requestor = Requestor::new(dir.path(), false);
        requestor
            .accept_result(
                CompilationResult::new("p/X.java")
                    .with_problem(zork())
                    .with_problem(Problem::warning("p/X.java", 5, "Dead code")),
            )
            .unwrap();

        assert!(requestor.has_errors());
        assert_eq!(
            requestor.problem_log(),
            "----------\n\
             1. ERROR in p\\X.java (at line 3)\n\
             \tZork z;\n\
             \t^^^^\n\
             Zork cannot be resolved to a type\n\
             ----------\n\
             2. WARNING in p\\X.java (at line 5)\n\
             Dead code\n\
             ----------\n"
        );
    }

    #[test]
    fn test_category_and_token_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        let mut requestor = Requestor::new(dir.path(), false)
            .show_category(true)
            .show_warning_token(true);
        requestor
            .accept_result(
                CompilationResult::new("X.java").with_problem(
                    Problem::warning("X.java", 1, "The import a is never used")
                        .with_category("Unnecessary Code")
                        .with_warning_token("unused"),
                ),
            )
            .unwrap();

        assert!(!requestor.has_errors());
        assert!(requestor
            .problem_log()
            .contains("[@cat:Unnecessary Code] [@sup:unused] The import a is never used\n"));
    }

    #[test]
    fn test_clean_result_renders_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut requestor = Requestor::new(dir.path(), false);
        requestor.accept_result(CompilationResult::new("X.java")).unwrap();
        assert!(!requestor.has_errors());
        assert_eq!(requestor.problem_log(), "");
    }

    #[test]
    fn test_generate_output_writes_class_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut requestor = Requestor::new(dir.path(), true);
        requestor
            .accept_result(
                CompilationResult::new("p/X.java").with_class_file("p/X.class", vec![0xCA, 0xFE]),
            )
            .unwrap();

        let written = dir.path().join("p").join("X.class");
        assert_eq!(std::fs::read(&written).unwrap(), vec![0xCA, 0xFE]);
        assert_eq!(requestor.class_files_written(), &[written]);
    }

    #[test]
    fn test_sink_sees_every_problem() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let dir = tempfile::tempdir().unwrap();
        let mut requestor = Requestor::new(dir.path(), false).with_sink(Box::new(
            move |p: &Problem| captured.lock().unwrap().push(p.message.clone()),
        ));
        requestor
            .accept_result(CompilationResult::new("p/X.java").with_problem(zork()))
            .unwrap();
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &["Zork cannot be resolved to a type".to_string()]
        );
    }
}
