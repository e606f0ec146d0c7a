//! Error types for the prefork server

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ConfigError;

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that end the supervisor process.
///
/// A worker reports its own [`WorkerError`] and exits; the supervisor only
/// sees the exit status.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Listening socket could not be created
    #[error("listener error: {0}")]
    Listen(#[from] ListenError),

    /// fork(2) failed
    #[error("fork failed: {0}")]
    Fork(#[source] io::Error),

    /// Signal mask or sigwait failure
    #[error("signal handling failed: {0}")]
    Signal(#[source] io::Error),

    /// waitpid(2) failed while reaping workers
    #[error("waitpid failed: {0}")]
    Wait(#[source] io::Error),

    /// Configuration rejected before startup
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Listener creation errors. All of them are fatal at startup.
#[derive(Error, Debug)]
pub enum ListenError {
    /// Host could not be resolved to an IPv4 address
    #[error("invalid listen address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// bind(2) failed (address in use, not available, permission denied)
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Any other socket-level failure
    #[error("socket {op} failed: {source}")]
    Socket {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Socket errors inside a worker that terminate the worker process.
///
/// The accept race is not represented here; see `Accepted::Raced` in the
/// runtime crate.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// poll(2) on the shared listener failed
    #[error("poll on listener failed: {0}")]
    Poll(#[source] io::Error),

    /// accept(2) failed with something other than would-block
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// Accepted connection could not be put into blocking mode
    #[error("cannot switch connection from {peer} to blocking mode: {source}")]
    Blocking {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Connection handler failed to read or write
    #[error("handler failed for {peer}: {source}")]
    Handler {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let e = ServerError::from(ListenError::Bind {
            addr,
            source: io::Error::from(io::ErrorKind::AddrInUse),
        });
        let msg = e.to_string();
        assert!(msg.starts_with("listener error: cannot bind 127.0.0.1:8080"));

        let e = ServerError::Fork(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(e.to_string().starts_with("fork failed"));
    }

    #[test]
    fn test_error_conversion() {
        let listen_err = ListenError::Socket {
            op: "listen",
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        let server_err: ServerError = listen_err.into();
        assert!(matches!(server_err, ServerError::Listen(ListenError::Socket { op: "listen", .. })));

        let cfg_err = ConfigError::InvalidValue("worker_count must be > 0");
        let server_err: ServerError = cfg_err.into();
        assert_eq!(server_err.to_string(), "invalid config: worker_count must be > 0");
    }
}
