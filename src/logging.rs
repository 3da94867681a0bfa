//! Logging setup
//!
//! Installs a `tracing` subscriber with an env-driven filter, a console
//! layer (human-readable or JSON) and an optional daily-rolling log file.
//! `RUST_LOG` overrides the configured filter.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::{OrchestratorError, OrchestratorResult};

/// Default filter directive
pub const DEFAULT_FILTER: &str = "orchestra_sdk=info";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub filter: String,
    /// Emit console output as JSON lines
    pub json: bool,
    /// Directory for a daily-rolling log file
    pub file_dir: Option<PathBuf>,
    /// File name prefix inside `file_dir`
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            json: false,
            file_dir: None,
            file_prefix: "orchestra.log".to_string(),
        }
    }
}

impl LogConfig {
    /// Set the filter directive
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Switch console output to JSON
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Also write to a daily-rolling file in `dir`
    pub fn with_file(mut self, dir: impl Into<PathBuf>) -> Self {
        self.file_dir = Some(dir.into());
        self
    }

    fn env_filter(&self) -> OrchestratorResult<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.filter)
                .map_err(|e| OrchestratorError::config(format!("Invalid log filter '{}': {}", self.filter, e))),
        }
    }
}

/// Install the global subscriber
///
/// Keep the returned guard alive for as long as file logging should be
/// flushed. Fails if a global subscriber is already set.
pub fn init_logging(config: LogConfig) -> OrchestratorResult<Option<WorkerGuard>> {
    let filter = config.env_filter()?;

    let plain = (!config.json).then(|| fmt::layer().with_target(true).with_writer(std::io::stderr));
    let json = config
        .json
        .then(|| fmt::layer().json().with_current_span(false).with_writer(std::io::stderr));

    let (file, guard) = match &config.file_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .with(file)
        .try_init()
        .map_err(|e| OrchestratorError::config(format!("Failed to install subscriber: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.filter, "orchestra_sdk=info");
        assert!(!config.json);
        assert!(config.file_dir.is_none());
    }

    #[test]
    fn test_builder_and_serde() {
        let config = LogConfig::default()
            .with_filter("orchestra_sdk=debug")
            .with_json(true)
            .with_file("/var/log/orchestra");
        assert!(config.json);

        let parsed: LogConfig = serde_json::from_str(r#"{"json": true}"#).unwrap();
        assert_eq!(parsed.filter, DEFAULT_FILTER);
        assert!(parsed.json);
    }

    #[test]
    fn test_invalid_filter_is_config_error() {
        let config = LogConfig::default().with_filter("orchestra_sdk=loudest");
        if std::env::var("RUST_LOG").is_err() {
            assert!(matches!(config.env_filter(), Err(OrchestratorError::Config(_))));
        }
    }
}
