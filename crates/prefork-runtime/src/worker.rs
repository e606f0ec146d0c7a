//! Worker loop
//!
//! Runs inside each forked worker process. One connection at a time:
//!
//! ```text
//!   WAITING ──ready──▶ ACCEPTING ──claimed──▶ HANDLING
//!      ▲  │                 │                    │
//!      │  └──timeout──┐     └──raced──┐          │
//!      └──────────────┴───────────────┴──────────┘
//! ```
//!
//! The readiness wait is bounded so an idle worker still wakes up
//! periodically. The supervisor check runs after every pass, busy or not.

use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use nix::unistd::{getppid, Pid};

use prefork_core::{ConnectionHandler, WorkerError};

use crate::listener::{Accepted, SharedListener};

/// Result of one pass through the worker state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Readiness wait timed out
    Idle,
    /// Listener was ready but a sibling claimed the connection
    Raced,
    /// A connection was accepted and handled
    Served(SocketAddr),
}

/// Per-worker counters, reported when the loop ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub served: u64,
    pub raced: u64,
    pub idle: u64,
}

pub struct Worker<'a, H> {
    listener: &'a SharedListener,
    handler: H,
    poll_timeout: Duration,
    /// Supervisor pid; the worker quits once it is reparented
    parent: Option<Pid>,
    stats: WorkerStats,
}

impl<'a, H: ConnectionHandler> Worker<'a, H> {
    pub fn new(listener: &'a SharedListener, handler: H, poll_timeout: Duration) -> Self {
        Self {
            listener,
            handler,
            poll_timeout,
            parent: None,
            stats: WorkerStats::default(),
        }
    }

    /// Exit the loop cleanly once `getppid()` no longer returns `parent`.
    pub fn with_parent(mut self, parent: Pid) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// One WAITING → ACCEPTING → HANDLING pass.
    ///
    /// Errors are fatal to the worker.
    pub fn step(&mut self) -> Result<Step, WorkerError> {
        let ready = self
            .listener
            .wait_readable(self.poll_timeout)
            .map_err(WorkerError::Poll)?;
        if !ready {
            self.stats.idle += 1;
            return Ok(Step::Idle);
        }
        self.claim()
    }

    /// ACCEPTING → HANDLING. A sibling may already have taken the
    /// connection that made the listener readable.
    fn claim(&mut self) -> Result<Step, WorkerError> {
        match self.listener.accept()? {
            Accepted::Raced => {
                self.stats.raced += 1;
                Ok(Step::Raced)
            }
            Accepted::Connection(conn, peer) => {
                self.serve(conn, peer)?;
                self.stats.served += 1;
                Ok(Step::Served(peer))
            }
        }
    }

    /// Loop until orphaned or a fatal error.
    pub fn run(mut self) -> Result<WorkerStats, WorkerError> {
        loop {
            if let Step::Served(peer) = self.step()? {
                tracing::trace!(%peer, "served");
            }
            if self.orphaned() {
                tracing::info!("supervisor gone, worker exiting");
                return Ok(self.stats);
            }
        }
    }

    fn serve(&self, conn: TcpStream, peer: SocketAddr) -> Result<(), WorkerError> {
        // Reads on a freshly accepted non-blocking stream fail spuriously
        conn.set_nonblocking(false)
            .map_err(|source| WorkerError::Blocking { peer, source })?;
        self.handler
            .handle(conn, peer)
            .map_err(|source| WorkerError::Handler { peer, source })
    }

    fn orphaned(&self) -> bool {
        self.parent.is_some_and(|parent| getppid() != parent)
    }
}
