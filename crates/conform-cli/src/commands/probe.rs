//! `conform probe`

use crate::OutputFormat;
use conform_core::{ProcessRunner, ReferenceCompiler};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Serialize)]
struct ProbedInstallation {
    root: PathBuf,
    executable: PathBuf,
    raw_version: String,
    tier: String,
    minor: u32,
}

pub async fn probe_command(
    config_path: Option<&Path>,
    roots: Vec<PathBuf>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let roots = if roots.is_empty() {
        config.reference_roots.clone()
    } else {
        roots
    };
    if roots.is_empty() {
        anyhow::bail!("no reference installation given; pass --root or set CONFORM_REFERENCE_ROOTS");
    }

    let runner: ProcessRunner = config.runner();
    let mut probed = Vec::with_capacity(roots.len());
    let mut failures = Vec::new();
    for root in roots {
        debug!("Probing {}", root.display());
        match ReferenceCompiler::probe(&root, runner.clone()).await {
            Ok(compiler) => probed.push(ProbedInstallation {
                root: root.clone(),
                executable: compiler.executable().to_path_buf(),
                raw_version: compiler.raw_version().to_string(),
                tier: compiler.tier().to_string(),
                minor: compiler.minor(),
            }),
            Err(e) => failures.push(format!("{}: {}", root.display(), e)),
        }
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&probed)?),
        OutputFormat::Human => {
            for installation in &probed {
                println!(
                    "{}  version {}  tier {}  minor {}",
                    installation.root.display(),
                    installation.raw_version,
                    installation.tier,
                    installation.minor
                );
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("could not probe:\n  {}", failures.join("\n  "))
    }
}
