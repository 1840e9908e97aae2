//! CLI command implementations.
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `serve`   | `Serve`          |
//! | `pipe`    | `Pipe`           |
//! | `config`  | `Config`         |

pub mod config;
pub mod pipe;
pub mod serve;

pub use config::cmd_config;
pub use pipe::cmd_pipe;
pub use serve::cmd_serve;

use std::path::Path;

use anyhow::{Context, Result};

use vibe_pacer::config::PacerConfig;

/// Load `pacer.toml` (explicit path or project default), then apply
/// `PACER_*` environment overrides.
pub fn load_config(project_dir: &Path, config_path: Option<&Path>) -> Result<PacerConfig> {
    let mut config = match config_path {
        Some(path) => PacerConfig::load(path)?,
        None => PacerConfig::load_or_default(project_dir)?,
    };
    config
        .apply_env()
        .context("Failed to apply environment overrides")?;
    Ok(config)
}
