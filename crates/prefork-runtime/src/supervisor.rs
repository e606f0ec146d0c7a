//! Supervisor: the parent process
//!
//! Owns the listener and the set of worker pids. Forks workers until the
//! target count is reached, then sleeps in `sigwait` until a worker exits
//! (reap and top up again) or a shutdown signal arrives (SIGTERM every
//! worker and return, without waiting for them).

use std::net::SocketAddr;
use std::time::Instant;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, getpid, ForkResult, Pid};

use prefork_core::{ConnectionHandler, ServerConfig, ServerError, ServerResult};

use crate::exit_status::TerminationReason;
use crate::listener::SharedListener;
use crate::signal::{SupervisorEvent, SupervisorSignals};
use crate::worker::Worker;

/// One live worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerRecord {
    pub pid: Pid,
    pub spawned_at: Instant,
}

/// Worker pids tracked by the supervisor, with the count it maintains.
#[derive(Debug)]
pub struct WorkerSet {
    records: Vec<WorkerRecord>,
    target: usize,
}

impl WorkerSet {
    pub fn new(target: usize) -> Self {
        Self {
            records: Vec::with_capacity(target),
            target,
        }
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Workers missing to reach the target.
    pub fn deficit(&self) -> usize {
        self.target.saturating_sub(self.records.len())
    }

    pub fn insert(&mut self, pid: Pid) {
        self.records.push(WorkerRecord {
            pid,
            spawned_at: Instant::now(),
        });
    }

    pub fn remove(&mut self, pid: Pid) -> Option<WorkerRecord> {
        let idx = self.records.iter().position(|r| r.pid == pid)?;
        Some(self.records.swap_remove(idx))
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.records.iter().any(|r| r.pid == pid)
    }

    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.records.iter().map(|r| r.pid)
    }

    /// Empty the set, handing back every record exactly once.
    pub fn drain(&mut self) -> Vec<WorkerRecord> {
        std::mem::take(&mut self.records)
    }
}

pub struct Supervisor<H> {
    config: ServerConfig,
    listener: SharedListener,
    handler: H,
    workers: WorkerSet,
    pid: Pid,
}

impl<H: ConnectionHandler> Supervisor<H> {
    /// Validate the configuration and create the shared listener.
    pub fn new(config: ServerConfig, handler: H) -> ServerResult<Self> {
        config.validate()?;
        let listener = SharedListener::from_config(&config)?;
        Ok(Self::with_listener(config, listener, handler))
    }

    /// Use an already created listener.
    pub fn with_listener(config: ServerConfig, listener: SharedListener, handler: H) -> Self {
        let workers = WorkerSet::new(config.worker_count);
        Self {
            config,
            listener,
            handler,
            workers,
            pid: getpid(),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn workers(&self) -> &WorkerSet {
        &self.workers
    }

    /// Serve until SIGINT or SIGTERM. Every tracked worker is sent SIGTERM
    /// before this returns, whether it returns `Ok` or `Err`.
    pub fn run(&mut self) -> ServerResult<()> {
        let signals = SupervisorSignals::install()?;
        tracing::info!(
            addr = %self.local_addr(),
            workers = self.workers.target(),
            "listening"
        );
        let result = self.supervise(&signals);
        self.terminate_all();
        result
    }

    fn supervise(&mut self, signals: &SupervisorSignals) -> ServerResult<()> {
        loop {
            self.top_up(signals)?;
            match signals.wait()? {
                SupervisorEvent::Shutdown(signal) => {
                    tracing::info!(?signal, "shutdown requested");
                    return Ok(());
                }
                SupervisorEvent::ChildExited => {
                    if self.reap()? {
                        if let Some(signal) = self.back_off(signals)? {
                            tracing::info!(?signal, "shutdown requested during backoff");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Hold off the next top-up for `respawn_backoff` while still answering
    /// signals. Returns the shutdown signal if one arrived meanwhile.
    fn back_off(&mut self, signals: &SupervisorSignals) -> ServerResult<Option<Signal>> {
        let backoff = self.config.respawn_backoff;
        if backoff.is_zero() {
            return Ok(None);
        }
        tracing::warn!(?backoff, "worker died young, delaying respawn");
        let deadline = Instant::now() + backoff;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match signals.wait_timeout(remaining)? {
                None => return Ok(None),
                Some(SupervisorEvent::Shutdown(signal)) => return Ok(Some(signal)),
                Some(SupervisorEvent::ChildExited) => {
                    self.reap()?;
                }
            }
        }
    }

    /// Fork until the worker set is back at its target.
    fn top_up(&mut self, signals: &SupervisorSignals) -> ServerResult<()> {
        while self.workers.deficit() > 0 {
            let pid = self.spawn_worker(signals)?;
            self.workers.insert(pid);
            tracing::info!(%pid, "started worker");
        }
        Ok(())
    }

    fn spawn_worker(&self, signals: &SupervisorSignals) -> ServerResult<Pid> {
        // Safety: the supervisor is single-threaded; the child only runs the
        // worker loop and leaves through _exit.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => Ok(child),
            Ok(ForkResult::Child) => {
                let code = match signals.restore_for_child() {
                    Ok(()) => self.worker_main(),
                    Err(e) => {
                        tracing::error!(error = %e, "worker could not restore signal mask");
                        1
                    }
                };
                // Skip destructors: they belong to the supervisor
                unsafe { libc::_exit(code) }
            }
            Err(e) => Err(ServerError::Fork(e.into())),
        }
    }

    /// Body of a forked worker; returns its exit code.
    fn worker_main(&self) -> i32 {
        let _span = tracing::info_span!("worker", pid = %getpid()).entered();
        let worker = Worker::new(&self.listener, &self.handler, self.config.poll_timeout)
            .with_parent(self.pid);
        match worker.run() {
            Ok(stats) => {
                tracing::debug!(
                    served = stats.served,
                    raced = stats.raced,
                    idle = stats.idle,
                    "worker finished"
                );
                0
            }
            Err(e) => {
                tracing::error!(error = %e, "worker failed");
                1
            }
        }
    }

    /// Collect every exited child and drop its record. Returns whether any
    /// of them died younger than `min_worker_lifetime`.
    fn reap(&mut self) -> ServerResult<bool> {
        let mut died_young = false;
        loop {
            let status = match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
                Ok(status) => status,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(ServerError::Wait(e.into())),
            };
            let reason = TerminationReason::from(status);
            let Some(pid) = status.pid() else { continue };
            if !reason.is_terminated() {
                continue;
            }
            let Some(record) = self.workers.remove(pid) else {
                tracing::debug!(%pid, %reason, "reaped untracked child");
                continue;
            };

            let lived = record.spawned_at.elapsed();
            if reason.is_clean() {
                tracing::info!(%pid, %reason, ?lived, "worker exited");
            } else {
                tracing::warn!(%pid, %reason, ?lived, "worker died");
            }
            died_young |= lived < self.config.min_worker_lifetime;
        }

        Ok(died_young)
    }
}

impl<H> Supervisor<H> {
    /// Send SIGTERM to every tracked worker and forget them. No waiting, no
    /// draining. Returns how many workers were signalled; calling it again
    /// is a no-op.
    pub fn terminate_all(&mut self) -> usize {
        let records = self.workers.drain();
        for record in &records {
            match kill(record.pid, Signal::SIGTERM) {
                Ok(()) => tracing::debug!(pid = %record.pid, "sent SIGTERM"),
                Err(Errno::ESRCH) => tracing::debug!(pid = %record.pid, "worker already gone"),
                Err(e) => tracing::warn!(pid = %record.pid, error = %e, "failed to signal worker"),
            }
        }
        records.len()
    }
}

impl<H> Drop for Supervisor<H> {
    fn drop(&mut self) {
        self.terminate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prefork_core::CannedResponse;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{Child, Command};

    fn supervisor(workers: usize) -> Supervisor<CannedResponse> {
        let config = ServerConfig::new().host("127.0.0.1").worker_count(workers);
        let listener = SharedListener::create("127.0.0.1", 0, 16).unwrap();
        Supervisor::with_listener(config, listener, CannedResponse::default())
    }

    fn sleeper() -> Child {
        Command::new("sleep").arg("30").spawn().unwrap()
    }

    #[test]
    fn test_worker_set_tracking() {
        let mut set = WorkerSet::new(3);
        assert!(set.is_empty());
        assert_eq!(set.deficit(), 3);

        set.insert(Pid::from_raw(100));
        set.insert(Pid::from_raw(101));
        assert_eq!(set.len(), 2);
        assert_eq!(set.deficit(), 1);
        assert!(set.contains(Pid::from_raw(101)));

        set.insert(Pid::from_raw(102));
        assert_eq!(set.deficit(), 0);

        let removed = set.remove(Pid::from_raw(101)).unwrap();
        assert_eq!(removed.pid, Pid::from_raw(101));
        assert!(set.remove(Pid::from_raw(101)).is_none());
        assert_eq!(set.deficit(), 1);

        let mut pids: Vec<_> = set.pids().map(Pid::as_raw).collect();
        pids.sort();
        assert_eq!(pids, vec![100, 102]);
    }

    #[test]
    fn test_worker_set_drain_once() {
        let mut set = WorkerSet::new(2);
        set.insert(Pid::from_raw(7));
        set.insert(Pid::from_raw(8));
        assert_eq!(set.drain().len(), 2);
        assert!(set.drain().is_empty());
        assert_eq!(set.deficit(), 2);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ServerConfig::new().host("127.0.0.1").worker_count(0);
        let result = Supervisor::new(config, CannedResponse::default());
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[test]
    fn test_terminate_all_signals_every_worker() {
        let mut children = vec![sleeper(), sleeper()];
        let mut sup = supervisor(2);
        for child in &children {
            sup.workers.insert(Pid::from_raw(child.id() as i32));
        }

        assert_eq!(sup.terminate_all(), 2);
        assert!(sup.workers().is_empty());
        for child in &mut children {
            let status = child.wait().unwrap();
            assert_eq!(status.signal(), Some(libc::SIGTERM));
        }

        // Second pass has nothing left to signal
        assert_eq!(sup.terminate_all(), 0);
    }

    #[test]
    fn test_drop_terminates_workers() {
        let mut child = sleeper();
        {
            let mut sup = supervisor(1);
            sup.workers.insert(Pid::from_raw(child.id() as i32));
        }
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_back_off_yields_to_shutdown() {
        let config = ServerConfig::new()
            .host("127.0.0.1")
            .respawn_backoff(std::time::Duration::from_secs(5));
        let listener = SharedListener::create("127.0.0.1", 0, 16).unwrap();
        let mut sup = Supervisor::with_listener(config, listener, CannedResponse::default());

        let signals = SupervisorSignals::install().unwrap();
        nix::sys::signal::raise(Signal::SIGTERM).unwrap();
        let start = Instant::now();
        assert_eq!(sup.back_off(&signals).unwrap(), Some(Signal::SIGTERM));
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_back_off_disabled() {
        let config = ServerConfig::new()
            .host("127.0.0.1")
            .respawn_backoff(std::time::Duration::ZERO);
        let listener = SharedListener::create("127.0.0.1", 0, 16).unwrap();
        let mut sup = Supervisor::with_listener(config, listener, CannedResponse::default());

        let signals = SupervisorSignals::install().unwrap();
        assert_eq!(sup.back_off(&signals).unwrap(), None);
    }

    #[test]
    fn test_local_addr_from_listener() {
        let sup = supervisor(1);
        assert_ne!(sup.local_addr().port(), 0);
        assert_eq!(sup.workers().target(), 1);
    }
}
