//! # prefork-runtime
//!
//! Unix runtime for the prefork server.
//!
//! This crate provides:
//! - The shared listening socket (`SO_REUSEADDR`, `TCP_NODELAY`, bounded backlog)
//! - The per-process worker loop (poll, accept, handle)
//! - The supervisor that forks, tracks, reaps and terminates workers
//! - Signal plumbing between the two

pub mod exit_status;
pub mod listener;
pub mod signal;
pub mod supervisor;
pub mod worker;

// Re-exports
pub use exit_status::TerminationReason;
pub use listener::{Accepted, SharedListener};
pub use signal::{SupervisorEvent, SupervisorSignals};
pub use supervisor::{Supervisor, WorkerRecord, WorkerSet};
pub use worker::{Step, Worker, WorkerStats};

pub use prefork_core::{CannedResponse, ConnectionHandler, ServerConfig, ServerError, ServerResult};

// Platform detection
cfg_if::cfg_if! {
    if #[cfg(not(unix))] {
        compile_error!("prefork-runtime requires fork(2) and unix signals");
    }
}
