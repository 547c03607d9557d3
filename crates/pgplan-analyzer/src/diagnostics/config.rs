//! Thresholds used by the diagnostic engine
//!
//! Every field has a default, so a TOML file only needs the values it wants
//! to change:
//!
//! ```toml
//! large_table_rows = 5000
//! bottleneck_pct = 30.0
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating an [`AnalyzerConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Configuration for the plan analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Seq Scans examining at least this many rows are considered large
    pub large_table_rows: u64,
    /// Seq Scans examining at least this many rows are critical
    pub critical_table_rows: u64,
    /// With ANALYZE, a large Seq Scan must take at least this share of execution time
    pub seq_scan_min_pct: f64,
    /// Actual/planned row ratio above which an estimate counts as wrong
    pub misestimate_over: f64,
    /// Actual/planned row ratio below which an estimate counts as wrong
    pub misestimate_under: f64,
    /// Misestimates are ignored when both actual and planned rows are below this
    pub misestimate_min_rows: u64,
    /// Exclusive time share (percent) above which a node is a bottleneck
    pub bottleneck_pct: f64,
    /// A node whose single child holds this share of its time only passes rows through
    pub passthrough_share: f64,
    /// Inner-side loop count at which a Nested Loop is flagged
    pub nested_loop_loops: u64,
    /// Minimum inner-side inclusive time (ms) for the Nested Loop finding
    pub nested_loop_min_inner_ms: f64,
    /// Minimum inner-side total cost for the Nested Loop finding without ANALYZE
    pub nested_loop_min_inner_cost: f64,
    /// Share of examined rows a filter must discard to be called inefficient
    pub filter_discard_ratio: f64,
    /// Minimum number of discarded rows for the inefficient filter finding
    pub filter_min_removed: u64,
    /// Number of node types listed in the summary's top operations
    pub top_operations_limit: usize,
    /// Largest plan document accepted, in bytes
    pub max_input_bytes: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            large_table_rows: 1_000,
            critical_table_rows: 100_000,
            seq_scan_min_pct: 5.0,
            misestimate_over: 10.0,
            misestimate_under: 0.1,
            misestimate_min_rows: 100,
            bottleneck_pct: 20.0,
            passthrough_share: 0.95,
            nested_loop_loops: 1_000,
            nested_loop_min_inner_ms: 1.0,
            nested_loop_min_inner_cost: 10.0,
            filter_discard_ratio: 0.9,
            filter_min_removed: 1_000,
            top_operations_limit: 5,
            max_input_bytes: 5 * 1024 * 1024,
        }
    }
}

impl AnalyzerConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the large table threshold
    pub fn with_large_table_rows(mut self, rows: u64) -> Self {
        self.large_table_rows = rows;
        self
    }

    /// Sets the critical table threshold
    pub fn with_critical_table_rows(mut self, rows: u64) -> Self {
        self.critical_table_rows = rows;
        self
    }

    /// Sets the misestimation ratio band
    pub fn with_misestimate_band(mut self, under: f64, over: f64) -> Self {
        self.misestimate_under = under;
        self.misestimate_over = over;
        self
    }

    /// Sets the bottleneck threshold (percent of execution time)
    pub fn with_bottleneck_pct(mut self, pct: f64) -> Self {
        self.bottleneck_pct = pct.clamp(0.0, 100.0);
        self
    }

    /// Sets the Nested Loop rescan threshold
    pub fn with_nested_loop_loops(mut self, loops: u64) -> Self {
        self.nested_loop_loops = loops;
        self
    }

    /// Sets the filter discard ratio
    pub fn with_filter_discard_ratio(mut self, ratio: f64) -> Self {
        self.filter_discard_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Sets the input size limit
    pub fn with_max_input_bytes(mut self, bytes: usize) -> Self {
        self.max_input_bytes = bytes;
        self
    }

    /// Parses a config from TOML text and validates it
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded analyzer config");
        Ok(config)
    }

    /// Checks that thresholds are mutually consistent
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.critical_table_rows < self.large_table_rows {
            return Err(ConfigError::InvalidValue {
                field: "critical_table_rows",
                reason: format!(
                    "must be at least large_table_rows ({})",
                    self.large_table_rows
                ),
            });
        }
        if !(self.misestimate_under > 0.0 && self.misestimate_under < 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "misestimate_under",
                reason: "must be between 0 and 1 (exclusive)".to_string(),
            });
        }
        if self.misestimate_over <= 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "misestimate_over",
                reason: "must be greater than 1".to_string(),
            });
        }
        for (field, pct) in [
            ("seq_scan_min_pct", self.seq_scan_min_pct),
            ("bottleneck_pct", self.bottleneck_pct),
        ] {
            if !(0.0..=100.0).contains(&pct) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be a percentage between 0 and 100".to_string(),
                });
            }
        }
        for (field, ratio) in [
            ("passthrough_share", self.passthrough_share),
            ("filter_discard_ratio", self.filter_discard_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be a ratio between 0 and 1".to_string(),
                });
            }
        }
        if self.max_input_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_input_bytes",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}
