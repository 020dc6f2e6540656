//! Tunables for fetching, retrying and navigating.
//!
//! All structs deserialize with `#[serde(default)]`, so a config file only
//! needs to name the knobs it changes:
//!
//! ```json
//! { "gap_tolerance": 16384, "retry": { "max_attempts": 5 } }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// The JSON document could not be decoded.
    #[snafu(display("Invalid configuration JSON: {source}"))]
    Json {
        /// Underlying serde_json error.
        source: serde_json::Error,
    },

    /// A value is outside its allowed range.
    #[snafu(display("Invalid configuration value for {field}: {reason}"))]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Exponential backoff policy applied to every transport request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
    /// Apply +/-25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            multiplier: 2.0,
            max_delay_ms: 5_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let raw = self.base_delay_ms as f64 * self.multiplier.powi(exp);
        let capped = raw.min(self.max_delay_ms as f64).max(0.0);
        let factor = if self.jitter {
            1.0 + rand::random::<f64>() * 0.5 - 0.25
        } else {
            1.0
        };
        Duration::from_micros((capped * factor * 1_000.0).round() as u64)
    }

    /// Reject policies that could never succeed or would shrink delays.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.max_attempts >= 1,
            InvalidSnafu {
                field: "retry.max_attempts",
                reason: "must be at least 1",
            }
        );
        ensure!(
            self.multiplier.is_finite() && self.multiplier >= 1.0,
            InvalidSnafu {
                field: "retry.multiplier",
                reason: format!("must be >= 1.0, got {}", self.multiplier),
            }
        );
        Ok(())
    }
}

/// Fetch engine tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Tail bytes requested when bootstrapping a shard's footer.
    pub bootstrap_suffix_len: u64,
    /// Largest gap (bytes) bridged when coalescing two ranges.
    pub gap_tolerance: u64,
    /// Row-group gaps above this are logged as discontinuities.
    pub discontinuity_tolerance: u64,
    /// Column whose statistics define each row group's time span.
    pub time_column: String,
    /// Shard file extension.
    pub file_extension: String,
    /// Backoff for transport requests.
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            bootstrap_suffix_len: 64 * 1024,
            gap_tolerance: 4 * 1024,
            discontinuity_tolerance: 64 * 1024,
            time_column: "timestamp".to_string(),
            file_extension: "parquet".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl FetchConfig {
    /// Decode and validate a JSON document.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: FetchConfig = serde_json::from_str(s).context(JsonSnafu)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.bootstrap_suffix_len >= crate::footer::FOOTER_TRAILER_LEN,
            InvalidSnafu {
                field: "bootstrap_suffix_len",
                reason: format!("must be at least 8, got {}", self.bootstrap_suffix_len),
            }
        );
        ensure!(
            !self.time_column.is_empty(),
            InvalidSnafu {
                field: "time_column",
                reason: "must not be empty",
            }
        );
        ensure!(
            !self.file_extension.is_empty() && !self.file_extension.contains('/'),
            InvalidSnafu {
                field: "file_extension",
                reason: format!("{:?} is not a file extension", self.file_extension),
            }
        );
        self.retry.validate()
    }
}

/// Page sizing for navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Rows shifted by a small-page pan.
    pub small_page_rows: u32,
    /// Nominal spacing between rows, in seconds.
    pub row_interval_secs: u32,
    /// Months probed backwards when jumping to the earliest data.
    pub max_lookback_months: u32,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            small_page_rows: 20,
            row_interval_secs: 60,
            max_lookback_months: 24,
        }
    }
}

impl NavigationConfig {
    /// Time shifted by a small-page pan.
    pub fn small_page(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.small_page_rows) * i64::from(self.row_interval_secs))
    }
}
