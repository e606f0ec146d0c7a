//! Unix signal handling via a blocked mask and sigwait(3)

use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{sigprocmask, SigSet, SigmaskHow, Signal};

use prefork_core::{ServerError, ServerResult};

/// What woke the supervisor up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// SIGINT or SIGTERM: terminate every worker and return
    Shutdown(Signal),
    /// SIGCHLD: at least one worker changed state and may need reaping
    ChildExited,
}

/// Supervisor signal mask.
///
/// While alive, SIGINT, SIGTERM and SIGCHLD are blocked on the calling
/// thread and only observable through [`wait`](Self::wait). Dropping it
/// restores the previous mask.
#[derive(Debug)]
pub struct SupervisorSignals {
    watched: SigSet,
    previous: SigSet,
}

impl SupervisorSignals {
    /// Block the supervisor signals. Must happen before the first fork so a
    /// worker exiting early cannot slip past the first `wait`.
    pub fn install() -> ServerResult<Self> {
        let mut watched = SigSet::empty();
        watched.add(Signal::SIGINT);
        watched.add(Signal::SIGTERM);
        watched.add(Signal::SIGCHLD);

        let mut previous = SigSet::empty();
        sigprocmask(SigmaskHow::SIG_BLOCK, Some(&watched), Some(&mut previous))
            .map_err(|e| ServerError::Signal(e.into()))?;

        Ok(Self { watched, previous })
    }

    /// Suspend until one of the watched signals is pending, then consume it.
    pub fn wait(&self) -> ServerResult<SupervisorEvent> {
        loop {
            match self.watched.wait() {
                Ok(signal) => return Ok(Self::event(signal)),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(ServerError::Signal(e.into())),
            }
        }
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout` and returns
    /// `None` if no watched signal arrived.
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    pub fn wait_timeout(&self, timeout: Duration) -> ServerResult<Option<SupervisorEvent>> {
        let ts = libc::timespec {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_nsec: timeout.subsec_nanos() as libc::c_long,
        };
        loop {
            // Safety: the set and timespec outlive the call; siginfo is optional
            let ret =
                unsafe { libc::sigtimedwait(self.watched.as_ref(), std::ptr::null_mut(), &ts) };
            if ret >= 0 {
                let signal = Signal::try_from(ret).map_err(|e| ServerError::Signal(e.into()))?;
                return Ok(Some(Self::event(signal)));
            }
            match Errno::last() {
                Errno::EAGAIN => return Ok(None),
                Errno::EINTR => continue,
                e => return Err(ServerError::Signal(e.into())),
            }
        }
    }

    /// No sigtimedwait here; signals stay pending until the next `wait`.
    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    pub fn wait_timeout(&self, timeout: Duration) -> ServerResult<Option<SupervisorEvent>> {
        std::thread::sleep(timeout);
        Ok(None)
    }

    fn event(signal: Signal) -> SupervisorEvent {
        match signal {
            Signal::SIGCHLD => SupervisorEvent::ChildExited,
            other => SupervisorEvent::Shutdown(other),
        }
    }

    /// Called in a freshly forked worker: give back the mask the supervisor
    /// started with so SIGTERM and SIGINT kill the worker outright.
    pub fn restore_for_child(&self) -> nix::Result<()> {
        sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None)
    }
}

impl Drop for SupervisorSignals {
    fn drop(&mut self) {
        if let Err(e) = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None) {
            tracing::warn!(error = %e, "failed to restore signal mask");
        }
    }
}
