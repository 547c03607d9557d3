//! Logging setup for the `pgplan` binary
//!
//! All log output goes to stderr so that reports on stdout stay machine
//! readable. `RUST_LOG` takes precedence over the configured filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,

    /// Whether to include file/line information in logs
    pub include_location: bool,

    /// Emit one JSON object per event instead of plain lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "warn,pgplan_analyzer=info,pgplan=info".to_string(),
            include_location: false,
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Configuration for `--verbose`: debug output with source locations
    pub fn verbose() -> Self {
        Self {
            default_filter: "info,pgplan_analyzer=debug,pgplan=debug".to_string(),
            include_location: true,
            json: false,
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

/// Initialize the logging system with the given configuration
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = config.env_filter();

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.with_ansi(false).compact())
            .try_init()?;
    }

    tracing::debug!(filter = %config.default_filter, json = config.json, "logging initialized");
    Ok(())
}
