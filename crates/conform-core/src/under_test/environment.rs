//! Type lookup for the compiler under test

use crate::under_test::CompilationUnit;
use indexmap::IndexMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Where a requested type was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeAnswer {
    Source(CompilationUnit),
    Binary(PathBuf),
}

/// Resolves qualified type names (`p.q.X`) during compilation
pub trait NameEnvironment: Send + Sync {
    fn find_type(&self, qualified_name: &str) -> Option<TypeAnswer>;

    fn is_package(&self, qualified_name: &str) -> bool;

    /// Binary lookup locations, for compilers that search them themselves
    fn classpath(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Release whatever the environment holds open
    fn cleanup(&self);
}

/// Source units and dependent files held in memory, then classpath entries
#[derive(Debug, Default)]
pub struct InMemoryNameEnvironment {
    units: IndexMap<String, CompilationUnit>,
    classpath: Vec<PathBuf>,
    cleaned: AtomicBool,
}

impl InMemoryNameEnvironment {
    pub fn new<'a>(
        units: impl IntoIterator<Item = &'a CompilationUnit>,
        classpath: Vec<PathBuf>,
    ) -> Self {
        let units = units
            .into_iter()
            .map(|unit| (unit.type_name(), unit.clone()))
            .collect();
        Self {
            units,
            classpath,
            cleaned: AtomicBool::new(false),
        }
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned.load(Ordering::SeqCst)
    }

    fn find_on_classpath(&self, qualified_name: &str) -> Option<PathBuf> {
        let relative = format!("{}.class", qualified_name.replace('.', "/"));
        self.classpath
            .iter()
            .map(|entry| entry.join(&relative))
            .find(|candidate| candidate.is_file())
    }
}

impl NameEnvironment for InMemoryNameEnvironment {
    fn find_type(&self, qualified_name: &str) -> Option<TypeAnswer> {
        if let Some(unit) = self.units.get(qualified_name) {
            return Some(TypeAnswer::Source(unit.clone()));
        }
        self.find_on_classpath(qualified_name).map(TypeAnswer::Binary)
    }

    fn is_package(&self, qualified_name: &str) -> bool {
        let prefix = format!("{qualified_name}.");
        if self.units.keys().any(|name| name.starts_with(&prefix)) {
            return true;
        }
        let relative: PathBuf = qualified_name.split('.').collect();
        self.classpath
            .iter()
            .any(|entry| entry.join(&relative).is_dir())
    }

    fn classpath(&self) -> Vec<PathBuf> {
        self.classpath.clone()
    }

    fn cleanup(&self) {
        if !self.cleaned.swap(true, Ordering::SeqCst) {
            debug!("Released name environment ({} units)", self.units.len());
        }
    }
}

/// Owns an environment and cleans it up when dropped, unwinding included
pub struct EnvironmentGuard {
    environment: Box<dyn NameEnvironment>,
}

impl EnvironmentGuard {
    pub fn new(environment: Box<dyn NameEnvironment>) -> Self {
        Self { environment }
    }
}

impl Deref for EnvironmentGuard {
    type Target = dyn NameEnvironment;

    fn deref(&self) -> &Self::Target {
        self.environment.as_ref()
    }
}

impl Drop for EnvironmentGuard {
    fn drop(&mut self) {
        self.environment.cleanup();
    }
}

/// Output directory first, then the platform libraries
pub fn default_classpath(output_dir: &Path, platform_libraries: &[PathBuf]) -> Vec<PathBuf> {
    std::iter::once(output_dir.to_path_buf())
        .chain(platform_libraries.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_finds_sources_then_classpath() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib").join("Dep.class"), [0u8; 4]).unwrap();

        let units = [CompilationUnit::new("p/X.java", "package p; class X {}")];
        let env = InMemoryNameEnvironment::new(&units, vec![dir.path().to_path_buf()]);

        assert!(matches!(env.find_type("p.X"), Some(TypeAnswer::Source(_))));
        assert_eq!(
            env.find_type("lib.Dep"),
            Some(TypeAnswer::Binary(dir.path().join("lib").join("Dep.class")))
        );
        assert!(env.find_type("q.Missing").is_none());
        assert!(env.is_package("p"));
        assert!(env.is_package("lib"));
        assert!(!env.is_package("nope"));
    }

    struct Counting(Arc<AtomicUsize>);

    impl NameEnvironment for Counting {
        fn find_type(&self, _: &str) -> Option<TypeAnswer> {
            None
        }
        fn is_package(&self, _: &str) -> bool {
            false
        }
        fn cleanup(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_guard_cleans_up_on_panic() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&cleanups);
        let result = std::panic::catch_unwind(move || {
            let _guard = EnvironmentGuard::new(Box::new(Counting(counter)));
            panic!("compiler blew up");
        });
        assert!(result.is_err());
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        {
            let _guard = EnvironmentGuard::new(Box::new(Counting(Arc::clone(&cleanups))));
        }
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_default_classpath_order() {
        let cp = default_classpath(Path::new("/out"), &[PathBuf::from("/jdk/lib/rt.jar")]);
        assert_eq!(cp, vec![PathBuf::from("/out"), PathBuf::from("/jdk/lib/rt.jar")]);
    }
}
