//! Versioned excuses for known reference disagreements
//!
//! An [`Excuse`] names a set of mismatch kinds it may clear and the reference
//! versions it applies to. Excuses live in a [`WaiverRegistry`] built once
//! per process. Which excuses were put in force and which were actually
//! consulted is tracked per test class by a [`WaiverLedger`], so excuses that
//! stopped being needed surface as failures instead of rotting in place.

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::mismatch::{MismatchKind, MismatchSet};
use crate::reference::{ReferenceCompiler, ReferenceVersion, ReleaseTier};
use crate::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Fixed starting at the pivot
    Forward,
    /// Only a problem starting at the pivot
    Reverse,
}

/// A (tier, minor) boundary on reference versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pivot {
    pub tier: ReleaseTier,
    pub minor: u32,
    pub orientation: Orientation,
}

impl Pivot {
    pub fn forward(tier: ReleaseTier, minor: u32) -> Self {
        Self {
            tier,
            minor,
            orientation: Orientation::Forward,
        }
    }

    pub fn reverse(tier: ReleaseTier, minor: u32) -> Self {
        Self {
            tier,
            minor,
            orientation: Orientation::Reverse,
        }
    }

    pub fn applies_to(&self, tier: ReleaseTier, minor: u32) -> bool {
        let before_pivot = tier < self.tier || (tier == self.tier && minor < self.minor);
        match self.orientation {
            Orientation::Forward => before_pivot,
            Orientation::Reverse => !before_pivot,
        }
    }
}

/// Reference versions an excuse is in force for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applicability {
    Always,
    Pivot(Pivot),
    /// Tiers strictly before
    Before(ReleaseTier),
    /// The tier and everything after it
    Since(ReleaseTier),
    /// Tiers strictly after
    After(ReleaseTier),
    /// Exactly this tier
    Only(ReleaseTier),
    /// Exactly one build
    Exact { tier: ReleaseTier, minor: u32 },
}

impl Applicability {
    pub fn applies_to(&self, version: &ReferenceVersion) -> bool {
        let tier = version.tier;
        match *self {
            Applicability::Always => true,
            Applicability::Pivot(pivot) => pivot.applies_to(tier, version.minor),
            Applicability::Before(bound) => tier < bound,
            Applicability::Since(bound) => tier >= bound,
            Applicability::After(bound) => tier > bound,
            Applicability::Only(bound) => tier == bound,
            Applicability::Exact { tier: t, minor } => tier == t && version.minor == minor,
        }
    }
}

impl fmt::Display for Applicability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Applicability::Always => write!(f, "always"),
            Applicability::Pivot(p) => match p.orientation {
                Orientation::Forward => write!(f, "before {}/{:04}", p.tier, p.minor),
                Orientation::Reverse => write!(f, "from {}/{:04}", p.tier, p.minor),
            },
            Applicability::Before(t) => write!(f, "tier < {t}"),
            Applicability::Since(t) => write!(f, "tier >= {t}"),
            Applicability::After(t) => write!(f, "tier > {t}"),
            Applicability::Only(t) => write!(f, "tier == {t}"),
            Applicability::Exact { tier, minor } => write!(f, "exactly {tier}/{minor:04}"),
        }
    }
}

/// A registered, immutable waiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excuse {
    name: String,
    clears: MismatchSet,
    applicability: Applicability,
    intermittent: bool,
    extra_options: Option<String>,
    description: Option<String>,
}

impl Excuse {
    /// An empty `clears` set clears anything
    pub fn new(name: impl Into<String>, clears: impl Into<MismatchSet>) -> Self {
        Self {
            name: name.into(),
            clears: clears.into(),
            applicability: Applicability::Always,
            intermittent: false,
            extra_options: None,
            description: None,
        }
    }

    pub fn with_pivot(self, tier: ReleaseTier, minor: u32) -> Self {
        self.applies(Applicability::Pivot(Pivot::forward(tier, minor)))
    }

    pub fn with_reverse_pivot(self, tier: ReleaseTier, minor: u32) -> Self {
        self.applies(Applicability::Pivot(Pivot::reverse(tier, minor)))
    }

    pub fn applies(mut self, applicability: Applicability) -> Self {
        self.applicability = applicability;
        self
    }

    pub fn intermittent(mut self) -> Self {
        self.intermittent = true;
        self
    }

    /// Reference compiler options appended while this excuse is in force
    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.extra_options = Some(options.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clear_set(&self) -> MismatchSet {
        self.clears
    }

    pub fn applicability(&self) -> Applicability {
        self.applicability
    }

    pub fn is_intermittent(&self) -> bool {
        self.intermittent
    }

    pub fn extra_options(&self) -> Option<&str> {
        self.extra_options.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// `Some(self)` when in force for `compiler`
    pub fn excuse_for(&self, compiler: &ReferenceCompiler) -> Option<&Excuse> {
        self.excuse_for_version(compiler.version())
    }

    pub fn excuse_for_version(&self, version: &ReferenceVersion) -> Option<&Excuse> {
        self.applicability.applies_to(version).then_some(self)
    }

    pub fn clears(&self, kind: MismatchKind) -> bool {
        self.clears.is_empty() || self.clears.contains(kind)
    }
}

impl fmt::Display for Excuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}; {}]", self.name, self.clears, self.applicability)?;
        if self.intermittent {
            write!(f, " (intermittent)")?;
        }
        Ok(())
    }
}

/// On-disk form of an excuse
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExcuseEntry {
    pub name: String,
    #[serde(default)]
    pub clears: MismatchSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot: Option<VersionBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_pivot: Option<VersionBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<ReleaseTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<ReleaseTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<ReleaseTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only: Option<ReleaseTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<VersionBound>,
    #[serde(default)]
    pub intermittent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VersionBound {
    pub tier: ReleaseTier,
    #[serde(default)]
    pub minor: u32,
}

impl TryFrom<ExcuseEntry> for Excuse {
    type Error = HarnessError;

    fn try_from(entry: ExcuseEntry) -> Result<Self> {
        let candidates = [
            entry
                .pivot
                .map(|b| Applicability::Pivot(Pivot::forward(b.tier, b.minor))),
            entry
                .reverse_pivot
                .map(|b| Applicability::Pivot(Pivot::reverse(b.tier, b.minor))),
            entry.before.map(Applicability::Before),
            entry.since.map(Applicability::Since),
            entry.after.map(Applicability::After),
            entry.only.map(Applicability::Only),
            entry.exact.map(|b| Applicability::Exact {
                tier: b.tier,
                minor: b.minor,
            }),
        ];
        let mut given = candidates.into_iter().flatten();
        let applicability = given.next().unwrap_or(Applicability::Always);
        if given.next().is_some() {
            return Err(HarnessError::waiver_error(format!(
                "excuse '{}' declares more than one version constraint",
                entry.name
            )));
        }

        let mut excuse = Excuse::new(entry.name, entry.clears).applies(applicability);
        excuse.intermittent = entry.intermittent;
        excuse.extra_options = entry.options;
        excuse.description = entry.description;
        Ok(excuse)
    }
}

#[derive(Debug, Default, Deserialize)]
struct WaiverFile {
    #[serde(default)]
    excuse: Vec<ExcuseEntry>,
}

/// All excuses known to the process, by name
#[derive(Debug, Clone, Default)]
pub struct WaiverRegistry {
    excuses: IndexMap<String, Arc<Excuse>>,
}

impl WaiverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in excuses plus `config.waiver_file`, if any
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        let mut registry = Self::builtin();
        if let Some(path) = &config.waiver_file {
            registry.load_file(path)?;
        }
        Ok(registry)
    }

    pub fn builtin() -> Self {
        use MismatchKind::*;
        use ReleaseTier::*;

        let mut registry = Self::new();
        let excuses = [
            Excuse::new("UnderTestHasSomeMoreWarnings", UnderTestWarningsReferenceNone),
            Excuse::new(
                "UnderTestWarningConfiguredAsError",
                MismatchSet::of_kinds(&[UnderTestErrorsReferenceWarnings, UnderTestErrorsReferenceNone]),
            ),
            Excuse::new("ReferenceCompilesBogusReferencedFileAgain", UnderTestErrorsReferenceNone),
            Excuse::new("ReferenceDoesNotCompileCorrectSource", ReferenceErrorsUnderTestNone),
            Excuse::new(
                "ReferenceCompilesIncorrectSource",
                MismatchSet::of_kinds(&[
                    UnderTestErrorsReferenceNone,
                    UnderTestErrorsReferenceWarnings,
                    UnderTestWarningsReferenceNone,
                ]),
            ),
            Excuse::new("ReferenceGeneratesIncorrectCode", StdoutMismatch),
            Excuse::new("ReferenceHasWarningsUnderTestNotConfigured", ReferenceWarningsUnderTestNone),
            Excuse::new("ReferenceHasErrorsUnderTestHasWarnings", ReferenceErrorsUnderTestWarnings),
            Excuse::new("ReferenceHasErrorsUnderTestHasNone", ReferenceErrorsUnderTestNone),
            Excuse::new("ReferenceThrowsAnException", ReferenceErrorsUnderTestNone),
            Excuse::new("ReferenceThrowsAnExceptionFor_1_5_0_16", ReferenceErrorsUnderTestNone)
                .applies(Applicability::Exact { tier: Jdk1_5, minor: 1600 }),
            Excuse::new("ReferenceThrowsAnExceptionSince9UnderTestWarns", ReferenceErrorsUnderTestWarnings)
                .applies(Applicability::Since(Jdk9)),
            Excuse::new("JavacBug5042462", ReferenceErrorsUnderTestNone).with_pivot(Jdk1_7, 0),
            Excuse::new("JavacBug6302954", ReferenceErrorsUnderTestNone).with_pivot(Jdk1_7, 0),
            Excuse::new("JavacBug6400189", UnderTestErrorsReferenceNone)
                .applies(Applicability::Only(Jdk1_6)),
            Excuse::new("JavacBug6500701", StdoutMismatch).with_pivot(Jdk1_7, 0),
            Excuse::new("JavacBug6575821", ReferenceErrorsUnderTestNone).with_pivot(Jdk1_6, 10),
            Excuse::new("JavacBug8144673", ReferenceErrorsUnderTestNone).with_pivot(Jdk9, 100),
            Excuse::new("JavacBug8204534", UnderTestErrorsReferenceNone).with_pivot(Jdk11, 0),
            Excuse::new("JavacBug8044196", UnderTestErrorsReferenceNone)
                .with_pivot(Jdk9, 0)
                .intermittent(),
            Excuse::new("JavacBug6337964", ReferenceErrorsUnderTestNone)
                .with_pivot(Jdk1_6, 1045)
                .intermittent(),
            Excuse::new("JavacBug8144832", ReferenceErrorsUnderTestNone).with_pivot(Jdk9, 0),
            Excuse::new("JavacBug8179483_switchExpression", UnderTestErrorsReferenceWarnings)
                .with_options(" --release 13 --enable-preview -Xlint:-preview"),
            Excuse::new("JavacBug8221413_switchExpression", ReferenceErrorsUnderTestNone)
                .with_options(" --release 12 --enable-preview -Xlint:-preview"),
            Excuse::new("ReferenceBugFixed_6_10", MismatchSet::EMPTY).with_pivot(Jdk1_6, 1000),
            Excuse::new("ReferenceBugFixed_6_10_b24", MismatchSet::EMPTY).with_pivot(Jdk1_6, 1010),
            Excuse::new("ReferenceBugFixed_7", MismatchSet::EMPTY).with_pivot(Jdk1_7, 0),
            Excuse::new("ReferenceBugFixed_901", MismatchSet::EMPTY).with_pivot(Jdk9, 100),
            Excuse::new("UnderTestBug177715", ReferenceErrorsUnderTestNone)
                .applies(Applicability::Before(Jdk1_8)),
            Excuse::new("UnderTestBug236236", UnderTestErrorsReferenceNone)
                .applies(Applicability::After(Jdk1_5)),
            Excuse::new("UnderTestJustification95021", ReferenceErrorsUnderTestNone)
                .applies(Applicability::Only(Jdk1_7)),
            Excuse::new("UnderTestJustification561549", UnderTestErrorsReferenceNone)
                .applies(Applicability::After(Jdk9)),
        ];
        for excuse in excuses {
            registry
                .excuses
                .insert(excuse.name().to_string(), Arc::new(excuse));
        }
        registry
    }

    /// Add an excuse; names are unique
    pub fn register(&mut self, excuse: Excuse) -> Result<Arc<Excuse>> {
        if self.excuses.contains_key(excuse.name()) {
            return Err(HarnessError::waiver_error(format!(
                "excuse '{}' is already registered",
                excuse.name()
            )));
        }
        let excuse = Arc::new(excuse);
        self.excuses
            .insert(excuse.name().to_string(), Arc::clone(&excuse));
        Ok(excuse)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let content =
            std::fs::read_to_string(path).map_err(|e| HarnessError::io_error(path, e))?;
        let count = self.load_toml(&content).map_err(|e| {
            HarnessError::waiver_error(format!("{}: {}", path.display(), e))
        })?;
        debug!("Loaded {} excuse(s) from {}", count, path.display());
        Ok(count)
    }

    pub fn load_toml(&mut self, content: &str) -> Result<usize> {
        let file: WaiverFile =
            toml::from_str(content).map_err(|e| HarnessError::waiver_error(e.to_string()))?;
        let count = file.excuse.len();
        for entry in file.excuse {
            self.register(Excuse::try_from(entry)?)?;
        }
        Ok(count)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Excuse>> {
        self.excuses.get(name).cloned()
    }

    /// Like [`get`](Self::get) but an unknown name is an error
    pub fn require(&self, name: &str) -> Result<Arc<Excuse>> {
        self.get(name)
            .ok_or_else(|| HarnessError::waiver_error(format!("unknown excuse '{name}'")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Excuse>> {
        self.excuses.values()
    }

    pub fn len(&self) -> usize {
        self.excuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.excuses.is_empty()
    }
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    excuse: Arc<Excuse>,
    consulted: bool,
}

/// An excuse that was in force but never consulted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnusedExcuse {
    pub name: String,
    pub reference: String,
    pub test: String,
    pub intermittent: bool,
}

impl fmt::Display for UnusedExcuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: unused excuse {} for reference {}",
            self.test, self.name, self.reference
        )
    }
}

/// Excuse, reference, test
type LedgerKey = (String, String, String);

/// Per-class record of excuses put in force and consulted
///
/// Every test invocation arms its own entry, so an excuse consulted by one
/// test does not cover another test that never needed it.
#[derive(Debug, Default)]
pub struct WaiverLedger {
    entries: IndexMap<LedgerKey, LedgerEntry>,
}

impl WaiverLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(excuse: &Excuse, reference: &str, test: &str) -> LedgerKey {
        (
            excuse.name().to_string(),
            reference.to_string(),
            test.to_string(),
        )
    }

    /// Record that `excuse` is in force for `reference` while `test` runs
    pub fn arm(&mut self, excuse: &Arc<Excuse>, reference: &str, test: &str) {
        self.entries
            .entry(Self::key(excuse, reference, test))
            .or_insert_with(|| LedgerEntry {
                excuse: Arc::clone(excuse),
                consulted: false,
            });
    }

    /// Ask `excuse` to clear `kind` for `test`, recording that it was consulted
    pub fn consult(
        &mut self,
        excuse: &Excuse,
        reference: &str,
        test: &str,
        kind: MismatchKind,
    ) -> bool {
        if let Some(entry) = self.entries.get_mut(&Self::key(excuse, reference, test)) {
            entry.consulted = true;
        }
        excuse.clears(kind)
    }

    /// Drain the ledger, returning the never-consulted entries
    pub fn sweep(&mut self) -> Vec<UnusedExcuse> {
        self.entries
            .drain(..)
            .filter(|(_, entry)| !entry.consulted)
            .map(|((name, reference, test), entry)| UnusedExcuse {
                name,
                reference,
                test,
                intermittent: entry.excuse.is_intermittent(),
            })
            .collect()
    }

    /// Sweep and turn non-intermittent leftovers into an error
    pub fn sweep_into_result(&mut self, class: &str) -> Result<()> {
        let mut names = Vec::new();
        for unused in self.sweep() {
            if unused.intermittent {
                warn!("{} (intermittent bug)", unused);
            } else {
                names.push(format!(
                    "{} ({}) in {}",
                    unused.name, unused.reference, unused.test
                ));
            }
        }
        if names.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::UnusedWaivers {
                class: class.to_string(),
                names,
            })
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
