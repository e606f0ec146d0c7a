//! # prefork-core
//!
//! Core types for the prefork server.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Forking, signals and socket setup live in `prefork-runtime`.
//!
//! ## Modules
//!
//! - `config` - Server configuration (defaults, env overrides, validation)
//! - `env` - Environment variable utilities
//! - `error` - Error types
//! - `handler` - Connection handler trait and the canned HTTP responder

pub mod config;
pub mod env;
pub mod error;
pub mod handler;

// Re-exports for convenience
pub use config::{ConfigError, ServerConfig};
pub use env::{env_get, env_get_bool, env_get_str};
pub use error::{ListenError, ServerError, ServerResult, WorkerError};
pub use handler::{CannedResponse, ConnectionHandler};
