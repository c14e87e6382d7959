//! The compiler under test and everything handed to it

pub mod command;
pub mod environment;
pub mod log;
pub mod options;
pub mod requestor;

pub use command::CommandCompiler;
pub use environment::{EnvironmentGuard, InMemoryNameEnvironment, NameEnvironment, TypeAnswer};
pub use log::{normalize_newlines, LogMatcher, ProblemLog};
pub use options::CompilerOptions;
pub use requestor::{
    ClassFile, CompilationResult, DiagnosticSink, Problem, Requestor, Severity,
};

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const PACKAGE_INFO_NAME: &str = "package-info";
const MODULE_INFO_NAME: &str = "module-info";

/// A source file: path relative to the source root plus its text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationUnit {
    pub path: String,
    pub contents: String,
}

impl CompilationUnit {
    pub fn new(path: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }

    /// `p/q/X.java` is `p.q.X`
    pub fn type_name(&self) -> String {
        let path = self.path.replace('\\', "/");
        let stem = match path.rfind('.') {
            Some(dot) if dot > path.rfind('/').map_or(0, |slash| slash + 1) => &path[..dot],
            _ => path.as_str(),
        };
        stem.replace('/', ".")
    }

    /// `package-info` and `module-info` units declare no runnable type
    pub fn is_descriptor(&self) -> bool {
        let name = self.type_name();
        let simple = name.rsplit('.').next().unwrap_or_default();
        simple == PACKAGE_INFO_NAME || simple == MODULE_INFO_NAME
    }
}

/// Boundary to the compiler being validated
///
/// Implementations report one [`CompilationResult`] per unit to the
/// requestor. An `Err` means the compiler itself failed, not that the
/// sources had problems.
#[async_trait]
pub trait CompilerUnderTest: Send + Sync {
    fn name(&self) -> &str {
        "compiler under test"
    }

    async fn compile(
        &self,
        units: &[CompilationUnit],
        options: &CompilerOptions,
        environment: &dyn NameEnvironment,
        requestor: &mut Requestor,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(CompilationUnit::new("X.java", "").type_name(), "X");
        assert_eq!(CompilationUnit::new("p/q/X.java", "").type_name(), "p.q.X");
        assert_eq!(CompilationUnit::new("p\\X.java", "").type_name(), "p.X");
        assert_eq!(CompilationUnit::new("a.b/X", "").type_name(), "a.b.X");
    }

    #[test]
    fn test_descriptors() {
        assert!(CompilationUnit::new("p/package-info.java", "").is_descriptor());
        assert!(CompilationUnit::new("module-info.java", "").is_descriptor());
        assert!(!CompilationUnit::new("p/Info.java", "").is_descriptor());
    }
}
