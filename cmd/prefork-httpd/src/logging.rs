//! Logging setup for prefork-httpd.
//!
//! # Environment Variables
//!
//! - `PREFORK_LOG` - Log filter directive (overrides RUST_LOG)
//! - `RUST_LOG` - Standard Rust log filter (fallback)
//!
//! Without either, the level follows the `--debug` flag.

use std::io::IsTerminal;

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Level used when no filter directive is given
    pub level: Level,
    /// Full `EnvFilter` directive, e.g. `prefork_runtime=trace`
    pub filter: Option<String>,
    /// Show the module path of each event
    pub show_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            filter: None,
            show_target: false,
        }
    }
}

impl LogConfig {
    /// Debug flag selects between `info` and `debug`.
    pub fn for_server(debug: bool) -> Self {
        Self {
            level: if debug { Level::DEBUG } else { Level::INFO },
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Apply `PREFORK_LOG`, then `RUST_LOG`.
    pub fn with_env_overrides(self) -> Self {
        match std::env::var("PREFORK_LOG").or_else(|_| std::env::var("RUST_LOG")) {
            Ok(filter) if !filter.trim().is_empty() => self.with_filter(filter),
            _ => self,
        }
    }

    fn build_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string().to_lowercase());
        match &self.filter {
            Some(filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| fallback()),
            None => fallback(),
        }
    }
}

/// Install the global subscriber, writing to stderr.
///
/// Silently ignores a second call.
pub fn init(config: LogConfig) {
    let layer = fmt::layer()
        .with_target(config.show_target)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(config.build_filter())
        .with(layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_server_level() {
        assert_eq!(LogConfig::for_server(false).level, Level::INFO);
        assert_eq!(LogConfig::for_server(true).level, Level::DEBUG);
        assert!(LogConfig::for_server(true).filter.is_none());
    }

    #[test]
    fn test_build_filter() {
        let filter = LogConfig::for_server(true).build_filter();
        assert_eq!(filter.to_string(), "debug");

        let filter = LogConfig::default()
            .with_filter("prefork_runtime=trace")
            .build_filter();
        assert_eq!(filter.to_string(), "prefork_runtime=trace");
    }

    #[test]
    fn test_invalid_filter_falls_back_to_level() {
        let filter = LogConfig::for_server(false)
            .with_filter("prefork=loud")
            .build_filter();
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn test_init_is_idempotent() {
        init(LogConfig::default());
        init(LogConfig::for_server(true));
    }
}
