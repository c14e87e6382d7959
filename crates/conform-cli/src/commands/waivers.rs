//! `conform waivers`

use crate::OutputFormat;
use conform_core::WaiverRegistry;
use serde_json::json;
use std::path::{Path, PathBuf};

pub fn waivers_command(
    config_path: Option<&Path>,
    file: Option<PathBuf>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let mut registry = WaiverRegistry::from_config(&config)?;
    if let Some(file) = file {
        let loaded = registry.load_file(&file)?;
        tracing::info!("Loaded {} excuse(s) from {}", loaded, file.display());
    }

    match format {
        OutputFormat::Json => {
            let excuses: Vec<_> = registry
                .iter()
                .map(|excuse| {
                    json!({
                        "name": excuse.name(),
                        "clears": excuse.clear_set(),
                        "applies": excuse.applicability().to_string(),
                        "intermittent": excuse.is_intermittent(),
                        "options": excuse.extra_options(),
                        "description": excuse.description(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&excuses)?);
        }
        OutputFormat::Human => {
            for excuse in registry.iter() {
                println!("{excuse}");
                if let Some(options) = excuse.extra_options() {
                    println!("    options: {options}");
                }
                if let Some(description) = excuse.description() {
                    println!("    {description}");
                }
            }
            println!("\n{} excuse(s)", registry.len());
        }
    }
    Ok(())
}
