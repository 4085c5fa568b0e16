//! Configuration for the context management engine.
//!
//! Every tunable constant is a field on [`ContextConfig`] and is passed into
//! each entry point explicitly. Two conversations (or two tests) with
//! different settings never share state.
//!
//! # Examples
//!
//! Defaults:
//!
//! ```
//! use condense_rs::config::ContextConfig;
//!
//! let config = ContextConfig::default();
//! assert_eq!(config.keep_messages, 3);
//! ```
//!
//! Builder overrides:
//!
//! ```
//! use condense_rs::config::ContextConfig;
//!
//! let config = ContextConfig::default()
//!     .with_keep_messages(4)
//!     .with_buffer_fraction(0.15);
//! assert!(config.validate().is_ok());
//! ```

use serde::Deserialize;
use std::path::Path;

/// Number of most recent messages never tagged by an operation in progress.
pub const N_MESSAGES_TO_KEEP: usize = 3;

/// Lowest accepted per-profile condense threshold (percent of the window).
pub const MIN_CONDENSE_THRESHOLD: f64 = 5.0;

/// Highest accepted per-profile condense threshold (percent of the window).
pub const MAX_CONDENSE_THRESHOLD: f64 = 100.0;

/// Fraction of the context window held back as safety margin.
pub const BUFFER_FRACTION: f64 = 0.10;

/// Fraction of visible history hidden by the truncation fallback.
pub const TRUNCATION_FRACTION: f64 = 0.5;

/// Output tokens reserved when the caller does not pass `max_tokens`.
pub const DEFAULT_RESERVED_TOKENS: u64 = 8192;

/// Profile threshold sentinel meaning "inherit the global percentage".
pub const INHERIT_THRESHOLD: f64 = -1.0;

/// Default characters per token for local estimates.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Tunables for condensation, truncation, and budget orchestration.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    /// Recent messages kept verbatim by condensation. Default: 3.
    pub keep_messages: usize,
    /// Minimum valid per-profile threshold (percent). Default: 5.
    pub min_condense_threshold: f64,
    /// Maximum valid per-profile threshold (percent). Default: 100.
    pub max_condense_threshold: f64,
    /// Safety margin as a fraction of the context window. Default: 0.10.
    pub buffer_fraction: f64,
    /// Fraction hidden by the truncation fallback. Default: 0.5.
    pub truncation_fraction: f64,
    /// Output reserve when no `max_tokens` is given. Default: 8192.
    pub default_reserved_tokens: u64,
    /// Characters per token for local estimates. Default: 3.5.
    pub chars_per_token: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            keep_messages: N_MESSAGES_TO_KEEP,
            min_condense_threshold: MIN_CONDENSE_THRESHOLD,
            max_condense_threshold: MAX_CONDENSE_THRESHOLD,
            buffer_fraction: BUFFER_FRACTION,
            truncation_fraction: TRUNCATION_FRACTION,
            default_reserved_tokens: DEFAULT_RESERVED_TOKENS,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl ContextConfig {
    /// Set the number of recent messages kept by condensation.
    pub fn with_keep_messages(mut self, n: usize) -> Self {
        self.keep_messages = n;
        self
    }

    /// Set the valid range for per-profile thresholds.
    pub fn with_threshold_range(mut self, min: f64, max: f64) -> Self {
        self.min_condense_threshold = min;
        self.max_condense_threshold = max;
        self
    }

    /// Set the safety margin fraction.
    pub fn with_buffer_fraction(mut self, fraction: f64) -> Self {
        self.buffer_fraction = fraction;
        self
    }

    /// Set the truncation fallback fraction.
    pub fn with_truncation_fraction(mut self, fraction: f64) -> Self {
        self.truncation_fraction = fraction;
        self
    }

    /// Set the default output reserve.
    pub fn with_default_reserved_tokens(mut self, tokens: u64) -> Self {
        self.default_reserved_tokens = tokens;
        self
    }

    /// Set the characters-per-token ratio used by local estimates.
    pub fn with_chars_per_token(mut self, cpt: f64) -> Self {
        self.chars_per_token = cpt;
        self
    }

    /// Check that the values are usable.
    pub fn validate(&self) -> Result<(), String> {
        if self.keep_messages == 0 {
            return Err("keep_messages must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.buffer_fraction) {
            return Err(format!(
                "buffer_fraction must be within [0, 1], got {}",
                self.buffer_fraction
            ));
        }
        if !(0.0..=1.0).contains(&self.truncation_fraction) {
            return Err(format!(
                "truncation_fraction must be within [0, 1], got {}",
                self.truncation_fraction
            ));
        }
        if self.min_condense_threshold > self.max_condense_threshold {
            return Err(format!(
                "min_condense_threshold ({}) exceeds max_condense_threshold ({})",
                self.min_condense_threshold, self.max_condense_threshold
            ));
        }
        if self.chars_per_token <= 0.0 {
            return Err("chars_per_token must be positive".into());
        }
        Ok(())
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, String> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
        let config: ContextConfig = serde_json::from_str(&json)
            .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))?;
        config.validate()?;
        Ok(config)
    }
}
