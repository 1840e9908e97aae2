//! Delay curve for paced emission.
//!
//! The delay before a newline-bearing chunk decays exponentially with the
//! number of lines still buffered behind it:
//!
//! ```text
//! delay = min + (max - min) * exp(-curve * adjusted_lines)
//! ```
//!
//! A full buffer drains near `min`; the tail of a response slows toward
//! `max` so output does not end abruptly.

use std::time::Duration;

use crate::config::PacingConfig;

/// Source of jitter samples in `[0, 1)`.
pub trait Jitter: Send {
    fn sample(&mut self) -> f64;
}

/// Uniform jitter from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn sample(&mut self) -> f64 {
        rand::random::<f64>()
    }
}

/// Constant jitter sample. `FixedJitter(0.5)` yields a factor of exactly 1.0.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl Jitter for FixedJitter {
    fn sample(&mut self) -> f64 {
        self.0.clamp(0.0, 1.0)
    }
}

/// Exponential decay curve with multiplicative jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingCurve {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub curve: f64,
    /// Half-width of the jitter band: `0.1` means `[0.9, 1.1]`.
    pub jitter: f64,
}

impl Default for PacingCurve {
    fn default() -> Self {
        Self::from(&PacingConfig::default())
    }
}

impl From<&PacingConfig> for PacingCurve {
    fn from(config: &PacingConfig) -> Self {
        Self {
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            curve: config.curve,
            jitter: config.jitter,
        }
    }
}

impl PacingCurve {
    /// Pre-jitter delay in milliseconds for `adjusted_lines` buffered lines.
    pub fn base_delay_ms(&self, adjusted_lines: usize) -> f64 {
        let min = self.min_delay.as_millis() as f64;
        let max = self.max_delay.as_millis() as f64;
        min + (max - min) * (-self.curve * adjusted_lines as f64).exp()
    }

    /// Jitter factor for a sample in `[0, 1)`.
    pub fn jitter_factor(&self, sample: f64) -> f64 {
        (1.0 - self.jitter) + sample * (2.0 * self.jitter)
    }

    /// Delay to wait before emitting a chunk, given the line budget left
    /// after that chunk's own newlines were subtracted.
    pub fn delay_for(&self, remaining_lines: usize, sample: f64) -> Duration {
        let adjusted = remaining_lines.saturating_sub(1);
        let ms = self.base_delay_ms(adjusted) * self.jitter_factor(sample);
        Duration::from_millis(ms.round().max(0.0) as u64)
    }
}
