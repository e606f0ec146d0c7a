//! Library defaults for [`ServerConfig`](super::ServerConfig).

/// Worker processes kept alive by the supervisor
pub const WORKER_COUNT: usize = 1;

/// Upper bound accepted by validation
pub const MAX_WORKER_COUNT: usize = 1024;

/// Host to bind (name or dotted IPv4)
pub const HOST: &str = "localhost";

/// TCP port to bind
pub const PORT: u16 = 8080;

/// Pending-connection queue shared by all workers
pub const BACKLOG: u32 = 512;

/// Bounded wait on listener readiness before a worker re-checks its parent
pub const POLL_TIMEOUT_MS: u64 = 1000;

/// Bytes read from each accepted connection
pub const READ_LIMIT: usize = 512;

/// Pause before replacing a worker that died young
pub const RESPAWN_BACKOFF_MS: u64 = 1000;

/// Workers dying sooner than this after spawn trigger the respawn backoff
pub const MIN_WORKER_LIFETIME_MS: u64 = 1000;

/// Debug-level logging
pub const DEBUG: bool = false;
