//! Configuration for the pacer, read from `pacer.toml`.
//!
//! Layering is file → environment → CLI flags. Every field has a default, so
//! an empty or missing file is valid.
//!
//! # Configuration File Format
//!
//! ```toml
//! [pacing]
//! min_delay_ms = 100
//! max_delay_ms = 1500
//! curve = 0.15
//! jitter = 0.1
//!
//! [server]
//! host = "127.0.0.1"
//! port = 3142
//! dedup_window_secs = 300
//! dedup_capacity = 1024
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "pacer.toml";

/// Parameters of the pacing delay curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Delay floor for a newline chunk with a deep backlog
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    /// Delay ceiling for the last buffered line
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Exponential decay rate per buffered line
    #[serde(default = "default_curve")]
    pub curve: f64,
    /// Jitter half-width; 0.1 scales each delay by a factor in [0.9, 1.1)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_min_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    1500
}

fn default_curve() -> f64 {
    0.15
}

fn default_jitter() -> f64 {
    0.1
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            curve: default_curve(),
            jitter: default_jitter(),
        }
    }
}

impl PacingConfig {
    /// No pacing at all; every chunk is emitted as soon as it is dequeued.
    pub fn immediate() -> Self {
        Self {
            min_delay_ms: 0,
            max_delay_ms: 0,
            curve: default_curve(),
            jitter: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_delay_ms > self.max_delay_ms {
            return Err(ConfigError::invalid(
                "pacing.min_delay_ms",
                self.min_delay_ms,
                &format!("must not exceed max_delay_ms ({})", self.max_delay_ms),
            ));
        }
        if !self.curve.is_finite() || self.curve < 0.0 {
            return Err(ConfigError::invalid(
                "pacing.curve",
                self.curve,
                "must be a finite, non-negative number",
            ));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(ConfigError::invalid(
                "pacing.jitter",
                self.jitter,
                "must be in [0, 1)",
            ));
        }
        Ok(())
    }
}

/// Relay server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// How long a request id is remembered for replay detection
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    /// Upper bound on remembered request ids
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3142
}

fn default_dedup_window_secs() -> u64 {
    300
}

fn default_dedup_capacity() -> usize {
    1024
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dedup_window_secs: default_dedup_window_secs(),
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

impl ServerSettings {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dedup_capacity == 0 {
            return Err(ConfigError::invalid(
                "server.dedup_capacity",
                self.dedup_capacity,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Root of `pacer.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PacerConfig {
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub server: ServerSettings,
}

impl PacerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `pacer.toml` from `dir`, or defaults if the file doesn't exist.
    pub fn load_or_default(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `PACER_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Keys are the `PACER_*`
    /// environment variable names.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PACER_MIN_DELAY_MS") {
            self.pacing.min_delay_ms = parse_override("PACER_MIN_DELAY_MS", &value)?;
        }
        if let Some(value) = lookup("PACER_MAX_DELAY_MS") {
            self.pacing.max_delay_ms = parse_override("PACER_MAX_DELAY_MS", &value)?;
        }
        if let Some(value) = lookup("PACER_CURVE") {
            self.pacing.curve = parse_override("PACER_CURVE", &value)?;
        }
        if let Some(value) = lookup("PACER_JITTER") {
            self.pacing.jitter = parse_override("PACER_JITTER", &value)?;
        }
        if let Some(value) = lookup("PACER_HOST") {
            self.server.host = value;
        }
        if let Some(value) = lookup("PACER_PORT") {
            self.server.port = parse_override("PACER_PORT", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pacing.validate()?;
        self.server.validate()
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, value, "not a valid number"))
}
