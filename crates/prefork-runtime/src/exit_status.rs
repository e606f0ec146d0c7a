//! Why a reaped worker went away.

use std::fmt;

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;

/// Reason a worker process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Normal exit with status code
    Exited(i32),
    /// Killed by signal
    Signaled(Signal),
    /// Stopped/continued/still running; not a termination
    NotTerminated,
}

impl TerminationReason {
    /// Worker left on its own with status 0 (e.g. orphaned after the
    /// supervisor disappeared).
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    pub fn is_terminated(&self) -> bool {
        !matches!(self, Self::NotTerminated)
    }
}

impl From<WaitStatus> for TerminationReason {
    fn from(status: WaitStatus) -> Self {
        match status {
            WaitStatus::Exited(_, code) => Self::Exited(code),
            WaitStatus::Signaled(_, signal, _) => Self::Signaled(signal),
            _ => Self::NotTerminated,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {}", code),
            Self::Signaled(sig) => write!(f, "killed by signal {:?}", sig),
            Self::NotTerminated => write!(f, "not terminated"),
        }
    }
}
