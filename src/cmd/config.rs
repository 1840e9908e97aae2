//! Configuration view and validation commands — `vibe-pacer config`.

use std::path::Path;

use anyhow::{Context, Result};

use vibe_pacer::config::{CONFIG_FILE, PacerConfig};

use super::super::ConfigCommands;

pub fn cmd_config(
    project_dir: &Path,
    config_path: Option<&Path>,
    command: Option<ConfigCommands>,
) -> Result<()> {
    let file = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| project_dir.join(CONFIG_FILE));

    match command {
        None | Some(ConfigCommands::Show) => {
            let config = super::load_config(project_dir, config_path)?;
            if file.exists() {
                println!("# Config file: {}", file.display());
            } else {
                println!("# No {} found, using defaults", CONFIG_FILE);
            }
            println!("# Effective values (with env overrides)");
            println!();
            print!("{}", config.to_toml()?);
        }
        Some(ConfigCommands::Validate) => {
            let config = super::load_config(project_dir, config_path)?;
            config
                .validate()
                .with_context(|| format!("Invalid configuration in {}", file.display()))?;
            println!("Configuration is valid.");
        }
        Some(ConfigCommands::Init) => {
            if file.exists() {
                anyhow::bail!("{} already exists", file.display());
            }
            PacerConfig::default()
                .save(&file)
                .context("Failed to write default configuration")?;
            println!("Created {}", file.display());
        }
    }

    Ok(())
}
