//! CLI command implementations
//!
//! - `probe`: resolve reference installations
//! - `waivers`: list registered excuses
//! - `run`: run a suite file

pub mod probe;
pub mod run;
pub mod waivers;

use conform_core::HarnessConfig;
use std::path::Path;

/// `CONFORM_*` variables, then the configuration file if one was given
pub fn load_config(config_path: Option<&Path>) -> anyhow::Result<HarnessConfig> {
    Ok(HarnessConfig::resolve(config_path)?)
}
