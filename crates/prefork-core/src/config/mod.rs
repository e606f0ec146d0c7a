//! Server Configuration
//!
//! Provides library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls (the binary maps CLI flags onto these)
//! 2. Environment variables (runtime)
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use prefork_core::config::ServerConfig;
//!
//! let config = ServerConfig::from_env()
//!     .worker_count(4)
//!     .port(8081);
//! config.validate()?;
//! ```

pub mod defaults;

use std::time::Duration;

use thiserror::Error;

use crate::env::{env_get, env_get_bool, env_get_str};

/// Server configuration with builder pattern.
///
/// Immutable once the supervisor starts; workers receive a copy at fork time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Number of worker processes
    pub worker_count: usize,
    /// Host to bind (name or dotted IPv4)
    pub host: String,
    /// TCP port to bind
    pub port: u16,
    /// listen(2) backlog
    pub backlog: u32,
    /// Bounded wait on listener readiness
    pub poll_timeout: Duration,
    /// Bytes read from each connection before responding
    pub read_limit: usize,
    /// Pause before replacing a worker that died young
    pub respawn_backoff: Duration,
    /// Lifetime under which a dead worker counts as dying young
    pub min_worker_lifetime: Duration,
    /// Enable debug logging
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    /// Create config from library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `PREFORK_WORKER_COUNT` - Number of worker processes
    /// - `PREFORK_HOST` - Host to bind
    /// - `PREFORK_PORT` - Port to bind
    /// - `PREFORK_BACKLOG` - listen(2) backlog
    /// - `PREFORK_POLL_TIMEOUT_MS` - Worker readiness wait in milliseconds
    /// - `PREFORK_READ_LIMIT` - Bytes read per connection
    /// - `PREFORK_RESPAWN_BACKOFF_MS` - Respawn backoff in milliseconds
    /// - `PREFORK_MIN_WORKER_LIFETIME_MS` - Crash-loop threshold in milliseconds
    /// - `PREFORK_DEBUG` - Enable debug logging (0/1)
    pub fn from_env() -> Self {
        Self {
            worker_count: env_get("PREFORK_WORKER_COUNT", defaults::WORKER_COUNT),
            host: env_get_str("PREFORK_HOST", defaults::HOST),
            port: env_get("PREFORK_PORT", defaults::PORT),
            backlog: env_get("PREFORK_BACKLOG", defaults::BACKLOG),
            poll_timeout: Duration::from_millis(env_get(
                "PREFORK_POLL_TIMEOUT_MS",
                defaults::POLL_TIMEOUT_MS,
            )),
            read_limit: env_get("PREFORK_READ_LIMIT", defaults::READ_LIMIT),
            respawn_backoff: Duration::from_millis(env_get(
                "PREFORK_RESPAWN_BACKOFF_MS",
                defaults::RESPAWN_BACKOFF_MS,
            )),
            min_worker_lifetime: Duration::from_millis(env_get(
                "PREFORK_MIN_WORKER_LIFETIME_MS",
                defaults::MIN_WORKER_LIFETIME_MS,
            )),
            debug: env_get_bool("PREFORK_DEBUG", defaults::DEBUG),
        }
    }

    /// Create config with explicit defaults (no env override).
    pub fn new() -> Self {
        Self {
            worker_count: defaults::WORKER_COUNT,
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
            backlog: defaults::BACKLOG,
            poll_timeout: Duration::from_millis(defaults::POLL_TIMEOUT_MS),
            read_limit: defaults::READ_LIMIT,
            respawn_backoff: Duration::from_millis(defaults::RESPAWN_BACKOFF_MS),
            min_worker_lifetime: Duration::from_millis(defaults::MIN_WORKER_LIFETIME_MS),
            debug: defaults::DEBUG,
        }
    }

    // Builder methods

    pub fn worker_count(mut self, n: usize) -> Self {
        self.worker_count = n;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn poll_timeout(mut self, d: Duration) -> Self {
        self.poll_timeout = d;
        self
    }

    pub fn read_limit(mut self, bytes: usize) -> Self {
        self.read_limit = bytes;
        self
    }

    pub fn respawn_backoff(mut self, d: Duration) -> Self {
        self.respawn_backoff = d;
        self
    }

    pub fn min_worker_lifetime(mut self, d: Duration) -> Self {
        self.min_worker_lifetime = d;
        self
    }

    pub fn debug(mut self, enable: bool) -> Self {
        self.debug = enable;
        self
    }

    /// `host:port` as given, before resolution.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::InvalidValue("worker_count must be > 0"));
        }
        if self.worker_count > defaults::MAX_WORKER_COUNT {
            return Err(ConfigError::InvalidValue("worker_count must be <= 1024"));
        }
        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue("host must not be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("port must be in 1..=65535"));
        }
        if self.backlog == 0 {
            return Err(ConfigError::InvalidValue("backlog must be > 0"));
        }
        if self.poll_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("poll_timeout must be > 0"));
        }
        if self.read_limit == 0 {
            return Err(ConfigError::InvalidValue("read_limit must be > 0"));
        }
        Ok(())
    }

    /// Log the effective configuration at debug level.
    pub fn log(&self) {
        tracing::debug!(
            worker_count = self.worker_count,
            listen = %self.listen_addr(),
            backlog = self.backlog,
            poll_timeout = ?self.poll_timeout,
            read_limit = self.read_limit,
            respawn_backoff = ?self.respawn_backoff,
            min_worker_lifetime = ?self.min_worker_lifetime,
            "server configuration"
        );
    }
}

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    InvalidValue(&'static str),
}
