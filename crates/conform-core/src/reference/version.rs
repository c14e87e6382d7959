//! Reference toolchain version tiers
//!
//! A raw version string such as `1.8.0_131` or `17.0.2` is normalized into a
//! [`ReleaseTier`] (the release generation) and a numeric *minor* that orders
//! builds within that tier. Minors grow with time so that "before" and
//! "after" relationships can be expressed on compilers of the same tier.
//!
//! Parsing is deliberately strict: an unrecognized version is an error, not a
//! guess. A mis-tiered reference compiler would silently corrupt every waiver
//! applicability decision made against it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while normalizing reference versions
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The raw version does not map to any known release tier
    #[error("unknown reference compiler version: {raw}")]
    UnknownVersion { raw: String },

    /// The tier is known but this particular build is not
    #[error("unknown raw reference compiler version: {raw} (tier {tier})")]
    UnknownMinor { tier: ReleaseTier, raw: String },

    /// A tier name that does not denote any release
    #[error("invalid release tier: {0}")]
    InvalidTier(String),
}

/// Release generations, in release order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReleaseTier {
    Jdk1_3,
    Jdk1_4,
    Jdk1_5,
    Jdk1_6,
    Jdk1_7,
    Jdk1_8,
    Jdk9,
    Jdk10,
    Jdk11,
    Jdk12,
    Jdk13,
    Jdk14,
    Jdk15,
    Jdk16,
    Jdk17,
    Jdk18,
    Jdk19,
    Jdk20,
    Jdk21,
    Jdk22,
    Jdk23,
    Jdk24,
    Jdk25,
}

impl ReleaseTier {
    pub const ALL: &'static [ReleaseTier] = &[
        ReleaseTier::Jdk1_3,
        ReleaseTier::Jdk1_4,
        ReleaseTier::Jdk1_5,
        ReleaseTier::Jdk1_6,
        ReleaseTier::Jdk1_7,
        ReleaseTier::Jdk1_8,
        ReleaseTier::Jdk9,
        ReleaseTier::Jdk10,
        ReleaseTier::Jdk11,
        ReleaseTier::Jdk12,
        ReleaseTier::Jdk13,
        ReleaseTier::Jdk14,
        ReleaseTier::Jdk15,
        ReleaseTier::Jdk16,
        ReleaseTier::Jdk17,
        ReleaseTier::Jdk18,
        ReleaseTier::Jdk19,
        ReleaseTier::Jdk20,
        ReleaseTier::Jdk21,
        ReleaseTier::Jdk22,
        ReleaseTier::Jdk23,
        ReleaseTier::Jdk24,
        ReleaseTier::Jdk25,
    ];

    /// Feature release number (`3` for 1.3, `17` for 17)
    pub fn feature(self) -> u32 {
        match self {
            ReleaseTier::Jdk1_3 => 3,
            ReleaseTier::Jdk1_4 => 4,
            ReleaseTier::Jdk1_5 => 5,
            ReleaseTier::Jdk1_6 => 6,
            ReleaseTier::Jdk1_7 => 7,
            ReleaseTier::Jdk1_8 => 8,
            ReleaseTier::Jdk9 => 9,
            ReleaseTier::Jdk10 => 10,
            ReleaseTier::Jdk11 => 11,
            ReleaseTier::Jdk12 => 12,
            ReleaseTier::Jdk13 => 13,
            ReleaseTier::Jdk14 => 14,
            ReleaseTier::Jdk15 => 15,
            ReleaseTier::Jdk16 => 16,
            ReleaseTier::Jdk17 => 17,
            ReleaseTier::Jdk18 => 18,
            ReleaseTier::Jdk19 => 19,
            ReleaseTier::Jdk20 => 20,
            ReleaseTier::Jdk21 => 21,
            ReleaseTier::Jdk22 => 22,
            ReleaseTier::Jdk23 => 23,
            ReleaseTier::Jdk24 => 24,
            ReleaseTier::Jdk25 => 25,
        }
    }

    pub fn from_feature(feature: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|tier| tier.feature() == feature)
    }

    /// Tiers from 9 on accept `--release`; earlier ones need `-source/-target`
    pub fn supports_release_flag(self) -> bool {
        self >= ReleaseTier::Jdk9
    }

    /// Reference compiler options that pin source and target to this tier
    pub fn release_options(self) -> String {
        if self.supports_release_flag() {
            format!("--release {}", self.feature())
        } else {
            format!("-source {self} -target {self}")
        }
    }
}

impl fmt::Display for ReleaseTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let feature = self.feature();
        if feature <= 8 {
            write!(f, "1.{feature}")
        } else {
            write!(f, "{feature}")
        }
    }
}

impl FromStr for ReleaseTier {
    type Err = VersionError;

    /// Accepts `1.8`, `8`, `17`, `jdk17`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let digits = normalized
            .strip_prefix("jdk")
            .unwrap_or(&normalized)
            .trim_start_matches('-');
        let digits = digits.strip_prefix("1.").unwrap_or(digits);
        digits
            .parse::<u32>()
            .ok()
            .and_then(Self::from_feature)
            .ok_or_else(|| VersionError::InvalidTier(s.to_string()))
    }
}

impl TryFrom<String> for ReleaseTier {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReleaseTier> for String {
    fn from(tier: ReleaseTier) -> Self {
        tier.to_string()
    }
}

/// Normalize a raw version into its tier
///
/// `executable_hint` is the resolved compiler path. Very old toolchains do
/// not answer the version query, so a `1.4` in the installation path is
/// accepted as a last resort.
pub fn tier_from_raw_version(
    raw: &str,
    executable_hint: Option<&str>,
) -> Result<ReleaseTier, VersionError> {
    let raw = raw.trim();
    let unknown = || VersionError::UnknownVersion {
        raw: raw.to_string(),
    };

    if let Some(rest) = raw.strip_prefix("1.") {
        return leading_number(rest)
            .and_then(ReleaseTier::from_feature)
            .filter(|tier| *tier <= ReleaseTier::Jdk1_8)
            .ok_or_else(unknown);
    }
    if let Some(tier) = leading_number(raw).and_then(ReleaseTier::from_feature) {
        if tier >= ReleaseTier::Jdk9 {
            return Ok(tier);
        }
    }
    if executable_hint.is_some_and(|path| path.contains("1.4")) {
        return Ok(ReleaseTier::Jdk1_4);
    }
    Err(unknown())
}

/// Map a known raw version to its minor within `tier`
pub fn minor_from_raw_version(tier: ReleaseTier, raw: &str) -> Result<u32, VersionError> {
    let raw = raw.trim();
    let unknown = || VersionError::UnknownMinor {
        tier,
        raw: raw.to_string(),
    };

    if tier <= ReleaseTier::Jdk1_8 {
        return LEGACY_MINORS
            .iter()
            .find(|(t, known, _)| *t == tier && *known == raw)
            .map(|(_, _, minor)| *minor)
            .ok_or_else(unknown);
    }

    // Feature releases: `N`, `N-ea`, `N.0.P`
    let feature = tier.feature().to_string();
    let rest = raw.strip_prefix(feature.as_str()).ok_or_else(unknown)?;
    match rest {
        "" | "-ea" => Ok(0),
        _ => {
            let patch = rest.strip_prefix(".0.").ok_or_else(unknown)?;
            match patch.parse::<u32>() {
                Ok(p) if (1..100).contains(&p) => Ok(p * 100),
                _ => Err(unknown()),
            }
        }
    }
}

/// Builds before 9 carry update and early-access suffixes with no regular
/// structure; only these are recognized.
const LEGACY_MINORS: &[(ReleaseTier, &str, u32)] = &[
    (ReleaseTier::Jdk1_5, "1.5.0_15-ea", 1500),
    (ReleaseTier::Jdk1_5, "1.5.0_16-ea", 1600),
    (ReleaseTier::Jdk1_6, "1.6.0_10-ea", 1000),
    (ReleaseTier::Jdk1_6, "1.6.0_10-beta", 1010),
    (ReleaseTier::Jdk1_6, "1.6.0_45", 1045),
    (ReleaseTier::Jdk1_7, "1.7.0-ea", 0),
    (ReleaseTier::Jdk1_7, "1.7.0_10", 1000),
    (ReleaseTier::Jdk1_7, "1.7.0_25", 2500),
    (ReleaseTier::Jdk1_7, "1.7.0_80", 8000),
    (ReleaseTier::Jdk1_8, "1.8.0-ea", 0),
    (ReleaseTier::Jdk1_8, "1.8.0", 0),
    (ReleaseTier::Jdk1_8, "1.8.0_40", 1000),
    (ReleaseTier::Jdk1_8, "1.8.0_45", 1100),
    (ReleaseTier::Jdk1_8, "1.8.0_60", 1500),
    (ReleaseTier::Jdk1_8, "1.8.0_131", 1700),
    (ReleaseTier::Jdk1_8, "1.8.0_152", 1900),
    (ReleaseTier::Jdk1_8, "1.8.0_162", 2100),
    (ReleaseTier::Jdk1_8, "1.8.0_171", 2200),
    (ReleaseTier::Jdk1_8, "1.8.0_172", 2300),
    (ReleaseTier::Jdk1_8, "1.8.0_181", 2400),
    (ReleaseTier::Jdk1_8, "1.8.0_182", 2500),
    (ReleaseTier::Jdk1_8, "1.8.0_202", 2600),
    (ReleaseTier::Jdk1_8, "1.8.0_212", 2700),
];

fn leading_number(s: &str) -> Option<u32> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}

/// A fully normalized reference version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceVersion {
    pub raw: String,
    pub tier: ReleaseTier,
    pub minor: u32,
}

impl ReferenceVersion {
    pub fn parse(raw: &str, executable_hint: Option<&str>) -> Result<Self, VersionError> {
        let tier = tier_from_raw_version(raw, executable_hint)?;
        let minor = minor_from_raw_version(tier, raw)?;
        Ok(Self {
            raw: raw.trim().to_string(),
            tier,
            minor,
        })
    }
}
