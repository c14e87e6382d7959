//! Compile options handed to the compiler under test

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const GENERATE: &str = "generate";
pub const PRESERVE: &str = "preserve";
pub const WARNING: &str = "warning";
pub const IGNORE: &str = "ignore";

pub const LOCAL_VARIABLE_ATTRIBUTE: &str = "debug.localVariable";
pub const UNUSED_PRIVATE_MEMBER: &str = "problem.unusedPrivateMember";
pub const UNUSED_IMPORT: &str = "problem.unusedImport";
pub const LOCAL_VARIABLE_HIDING: &str = "problem.localVariableHiding";
pub const FIELD_HIDING: &str = "problem.fieldHiding";
pub const POSSIBLE_ACCIDENTAL_BOOLEAN_ASSIGNMENT: &str = "problem.possibleAccidentalBooleanAssignment";
pub const SYNTHETIC_ACCESS_EMULATION: &str = "problem.syntheticAccessEmulation";
pub const UNNECESSARY_ELSE: &str = "problem.unnecessaryElse";
pub const DEAD_CODE: &str = "problem.deadCode";
pub const UNUSED_LOCAL: &str = "problem.unusedLocal";
pub const PRESERVE_UNUSED_LOCAL: &str = "codegen.unusedLocal";
pub const COMPLIANCE: &str = "compliance";

/// Ordered option name to value map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompilerOptions {
    entries: IndexMap<String, String>,
}

impl CompilerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings every test starts from
    pub fn test_defaults() -> Self {
        [
            (LOCAL_VARIABLE_ATTRIBUTE, GENERATE),
            (UNUSED_PRIVATE_MEMBER, WARNING),
            (UNUSED_IMPORT, WARNING),
            (LOCAL_VARIABLE_HIDING, WARNING),
            (FIELD_HIDING, WARNING),
            (POSSIBLE_ACCIDENTAL_BOOLEAN_ASSIGNMENT, WARNING),
            (SYNTHETIC_ACCESS_EMULATION, WARNING),
            (UNNECESSARY_ELSE, WARNING),
            (DEAD_CODE, WARNING),
            (UNUSED_LOCAL, IGNORE),
            (PRESERVE_UNUSED_LOCAL, PRESERVE),
        ]
        .into_iter()
        .collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.insert(name.into(), value.into());
        self
    }

    /// Overlay `overrides`; existing keys keep their position
    pub fn merge(&mut self, overrides: &CompilerOptions) -> &mut Self {
        for (name, value) in &overrides.entries {
            self.entries.insert(name.clone(), value.clone());
        }
        self
    }

    /// Defaults with `overrides` applied
    pub fn merged_with(overrides: Option<&CompilerOptions>) -> Self {
        let mut options = Self::test_defaults();
        if let Some(overrides) = overrides {
            options.merge(overrides);
        }
        options
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `name=value` lines
    pub fn to_properties(&self) -> String {
        self.iter().map(|(k, v)| format!("{k}={v}\n")).collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CompilerOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CompilerOptions::test_defaults();
        assert_eq!(options.get(LOCAL_VARIABLE_ATTRIBUTE), Some(GENERATE));
        assert_eq!(options.get(DEAD_CODE), Some(WARNING));
        assert_eq!(options.get(UNUSED_LOCAL), Some(IGNORE));
        assert_eq!(options.get(PRESERVE_UNUSED_LOCAL), Some(PRESERVE));
        assert_eq!(options.len(), 11);
    }

    #[test]
    fn test_overrides_merge_in_place() {
        let overrides: CompilerOptions =
            [(UNUSED_LOCAL, WARNING), (COMPLIANCE, "17")].into_iter().collect();
        let options = CompilerOptions::merged_with(Some(&overrides));

        assert_eq!(options.get(UNUSED_LOCAL), Some(WARNING));
        assert_eq!(options.get(COMPLIANCE), Some("17"));
        let names: Vec<&str> = options.iter().map(|(k, _)| k).collect();
        assert_eq!(names[9], UNUSED_LOCAL);
        assert_eq!(names.last(), Some(&COMPLIANCE));
    }

    #[test]
    fn test_properties_rendering() {
        let mut options = CompilerOptions::new();
        options.set("a", "1").set("b", "2");
        assert_eq!(options.to_properties(), "a=1\nb=2\n");
    }
}
