//! Environment variable utilities
//!
//! Small typed readers used by [`ServerConfig::from_env`](crate::ServerConfig::from_env).
//!
//! # Usage
//!
//! ```ignore
//! use prefork_core::env::{env_get, env_get_bool, env_get_str};
//!
//! let workers: usize = env_get("PREFORK_WORKER_COUNT", 1);
//! let host = env_get_str("PREFORK_HOST", "localhost");
//! let debug = env_get_bool("PREFORK_DEBUG", false);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default.
///
/// An unset variable and a value that fails to parse both yield `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Get environment variable as boolean
///
/// Accepts: "1", "true", "yes", "on" (case-insensitive) as true.
/// Any other value is false; an unset variable returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Get environment variable as string, or return default
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

// ============================================================================
// Tests
// ============================================================================
