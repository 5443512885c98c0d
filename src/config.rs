//! Simulator configuration
//!
//! Every section has sensible defaults so an empty JSON object (or no
//! configuration at all) yields a working simulator. Environment variables
//! prefixed with `VIA_POINTSIM_` override individual fields.

use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest back-dated span a seeded record may cover (100 years)
pub const MAX_SEED_SPAN_MS: u64 = 100 * 365 * 24 * 60 * 60 * 1000;

/// Largest magnitude accepted for a server timestamp offset (one day)
pub const MAX_SERVER_OFFSET_MS: i64 = 24 * 60 * 60 * 1000;

/// Top-level configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for the value generator (random seed when absent)
    pub seed: Option<u64>,
    /// Sampling scheduler settings
    pub sampling: SamplingConfig,
    /// History archive settings
    pub history: HistoryConfig,
    /// `tracing` filter directive used by the binary
    pub log_filter: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: None,
            sampling: SamplingConfig::default(),
            history: HistoryConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Floor applied to every requested sampling interval (default: 100)
    pub min_interval_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 100,
        }
    }
}

impl SamplingConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Number of back-dated entries before "now" (the record holds one more)
    pub seed_entries: usize,
    /// Spacing between seeded entries
    pub seed_spacing_ms: u64,
    /// Server timestamp offset of seeded entries (added to the source time)
    pub seed_server_offset_ms: i64,
    /// Period of the shared append timer
    pub append_interval_ms: u64,
    /// Server timestamp offset of appended entries (subtracted from the source time)
    pub append_server_offset_ms: i64,
    /// Appending stops once a record reaches this many entries
    pub max_entries: usize,
    /// Upper bound on values returned by one page
    pub max_page_size: usize,
    /// Cursors kept by a continuation store before the oldest is evicted
    pub max_continuation_points: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            seed_entries: 1000,
            seed_spacing_ms: 10_000,
            seed_server_offset_ms: 1234,
            append_interval_ms: 10_000,
            append_server_offset_ms: 4567,
            max_entries: 2000,
            max_page_size: 1000,
            max_continuation_points: 100,
        }
    }
}

impl HistoryConfig {
    pub fn append_interval(&self) -> Duration {
        Duration::from_millis(self.append_interval_ms)
    }
}

impl SimConfig {
    /// Parse a JSON document; missing fields fall back to defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `VIA_POINTSIM_*` environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(seed) = env_parse::<u64>("VIA_POINTSIM_SEED")? {
            self.seed = Some(seed);
        }
        if let Some(ms) = env_parse::<u64>("VIA_POINTSIM_MIN_INTERVAL_MS")? {
            self.sampling.min_interval_ms = ms;
        }
        if let Some(ms) = env_parse::<u64>("VIA_POINTSIM_HISTORY_INTERVAL_MS")? {
            self.history.append_interval_ms = ms;
        }
        if let Some(max) = env_parse::<usize>("VIA_POINTSIM_HISTORY_MAX_ENTRIES")? {
            self.history.max_entries = max;
        }
        if let Ok(filter) = std::env::var("VIA_POINTSIM_LOG") {
            self.log_filter = filter;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sampling.min_interval_ms == 0 {
            return Err(SimError::Config(
                "sampling.min_interval_ms must be positive".to_string(),
            ));
        }
        if self.history.append_interval_ms == 0 {
            return Err(SimError::Config(
                "history.append_interval_ms must be positive".to_string(),
            ));
        }
        if self.history.max_page_size == 0 {
            return Err(SimError::Config(
                "history.max_page_size must be positive".to_string(),
            ));
        }
        if self.history.max_continuation_points == 0 {
            return Err(SimError::Config(
                "history.max_continuation_points must be positive".to_string(),
            ));
        }
        self.history.validate_seed()
    }
}

impl HistoryConfig {
    /// The seeded record must fit under the cap and its back-dated span must
    /// stay within the timestamp range.
    fn validate_seed(&self) -> Result<()> {
        if self.seed_entries >= self.max_entries {
            return Err(SimError::Config(format!(
                "history.seed_entries ({}) leaves no room under history.max_entries ({})",
                self.seed_entries, self.max_entries
            )));
        }
        if i32::try_from(self.seed_entries).is_err() {
            return Err(SimError::Config(format!(
                "history.seed_entries must not exceed {}",
                i32::MAX
            )));
        }
        let span = u64::try_from(self.seed_entries)
            .ok()
            .and_then(|n| n.checked_mul(self.seed_spacing_ms));
        if span.is_none_or(|ms| ms > MAX_SEED_SPAN_MS) {
            return Err(SimError::Config(format!(
                "history.seed_entries * history.seed_spacing_ms exceeds {MAX_SEED_SPAN_MS} ms"
            )));
        }
        for (name, offset) in [
            ("seed_server_offset_ms", self.seed_server_offset_ms),
            ("append_server_offset_ms", self.append_server_offset_ms),
        ] {
            if offset.unsigned_abs() > MAX_SERVER_OFFSET_MS as u64 {
                return Err(SimError::Config(format!(
                    "history.{name} must be within {MAX_SERVER_OFFSET_MS} ms"
                )));
            }
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| SimError::Config(format!("{key} has an invalid value: {raw}"))),
        Err(_) => Ok(None),
    }
}
