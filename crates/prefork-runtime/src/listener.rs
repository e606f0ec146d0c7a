//! The shared listening socket
//!
//! Created once by the supervisor before any fork. Every worker inherits the
//! same descriptor, so all of them accept from one kernel queue and the
//! kernel decides who wins each connection.

use std::io;
use std::net::{SocketAddr, SocketAddrV4, TcpListener, TcpStream, ToSocketAddrs};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::socket::{self, sockopt, AddressFamily, Backlog, SockFlag, SockType, SockaddrIn};

use prefork_core::{ListenError, ServerConfig, WorkerError};

/// Outcome of a single accept attempt on the shared listener.
#[derive(Debug)]
pub enum Accepted {
    /// This worker claimed the connection
    Connection(TcpStream, SocketAddr),
    /// Another worker got there first (would-block); not an error
    Raced,
}

/// Non-blocking IPv4 listener shared by every worker process.
#[derive(Debug)]
pub struct SharedListener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl SharedListener {
    /// Create, configure, bind and listen.
    ///
    /// `host` is a name or dotted IPv4 address; the first IPv4 result is
    /// used. Port 0 picks an ephemeral port.
    pub fn create(host: &str, port: u16, backlog: u32) -> Result<Self, ListenError> {
        let addr = resolve_ipv4(host, port)?;

        let fd = socket::socket(AddressFamily::Inet, SockType::Stream, SockFlag::empty(), None)
            .map_err(|e| socket_error("create", e))?;

        // Rebind immediately after restart instead of waiting out TIME_WAIT
        socket::setsockopt(&fd, sockopt::ReuseAddr, &true)
            .map_err(|e| socket_error("setsockopt(SO_REUSEADDR)", e))?;
        // Small canned responses go out without Nagle coalescing
        socket::setsockopt(&fd, sockopt::TcpNoDelay, &true)
            .map_err(|e| socket_error("setsockopt(TCP_NODELAY)", e))?;

        socket::bind(fd.as_raw_fd(), &SockaddrIn::from(addr)).map_err(|e| ListenError::Bind {
            addr: SocketAddr::V4(addr),
            source: e.into(),
        })?;

        let backlog = Backlog::new(clamp_backlog(backlog)).map_err(|e| socket_error("listen", e))?;
        socket::listen(&fd, backlog).map_err(|e| socket_error("listen", e))?;

        let inner = TcpListener::from(fd);
        inner
            .set_nonblocking(true)
            .map_err(|source| ListenError::Socket { op: "set_nonblocking", source })?;
        let local_addr = inner
            .local_addr()
            .map_err(|source| ListenError::Socket { op: "getsockname", source })?;

        Ok(Self { inner, local_addr })
    }

    /// Create from the host, port and backlog of a server configuration.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ListenError> {
        Self::create(&config.host, config.port, config.backlog)
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Duplicate the descriptor. Both handles refer to the same socket and
    /// the same accept queue, exactly like a forked child's copy.
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            inner: self.inner.try_clone()?,
            local_addr: self.local_addr,
        })
    }

    /// Block for at most `timeout` until a connection is pending.
    ///
    /// Returns `Ok(false)` on timeout or when interrupted by a signal.
    pub fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        let mut fds = [PollFd::new(self.inner.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(n) => Ok(n > 0),
            Err(Errno::EINTR) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Try to claim one pending connection.
    pub fn accept(&self) -> Result<Accepted, WorkerError> {
        match self.inner.accept() {
            Ok((conn, peer)) => Ok(Accepted::Connection(conn, peer)),
            Err(e) if is_accept_race(&e) => Ok(Accepted::Raced),
            Err(e) => Err(WorkerError::Accept(e)),
        }
    }
}

impl AsFd for SharedListener {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

/// Would-block means a sibling accepted first. A client that reset before
/// we got to it, or a signal landing mid-accept, leaves nothing to serve
/// either; all three just send the worker back to waiting.
fn is_accept_race(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::ConnectionAborted | io::ErrorKind::Interrupted
    )
}

fn resolve_ipv4(host: &str, port: u16) -> Result<SocketAddrV4, ListenError> {
    let invalid = |reason: String| ListenError::InvalidAddress {
        addr: format!("{}:{}", host, port),
        reason,
    };
    let mut addrs = (host, port).to_socket_addrs().map_err(|e| invalid(e.to_string()))?;
    addrs
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(v4),
            SocketAddr::V6(_) => None,
        })
        .ok_or_else(|| invalid("no IPv4 address".to_string()))
}

/// The kernel silently truncates anything above SOMAXCONN; nix rejects it.
fn clamp_backlog(backlog: u32) -> i32 {
    i32::try_from(backlog).unwrap_or(i32::MAX).min(libc::SOMAXCONN)
}

fn socket_error(op: &'static str, e: Errno) -> ListenError {
    ListenError::Socket { op, source: e.into() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::socket::getsockopt;

    #[test]
    fn test_create_ephemeral() {
        let listener = SharedListener::create("127.0.0.1", 0, 16).unwrap();
        let addr = listener.local_addr();
        assert!(addr.is_ipv4());
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn test_socket_options() {
        let listener = SharedListener::create("127.0.0.1", 0, 16).unwrap();
        assert!(getsockopt(&listener, sockopt::ReuseAddr).unwrap());
        assert!(getsockopt(&listener, sockopt::TcpNoDelay).unwrap());
    }

    #[test]
    fn test_resolves_localhost() {
        let listener = SharedListener::create("localhost", 0, 16).unwrap();
        assert!(listener.local_addr().ip().is_loopback());
    }

    #[test]
    fn test_accept_without_pending_is_race() {
        let listener = SharedListener::create("127.0.0.1", 0, 16).unwrap();
        assert!(matches!(listener.accept(), Ok(Accepted::Raced)));
        assert!(!listener.wait_readable(Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn test_readable_after_connect() {
        let listener = SharedListener::create("127.0.0.1", 0, 16).unwrap();
        let _client = TcpStream::connect(listener.local_addr()).unwrap();
        assert!(listener.wait_readable(Duration::from_secs(5)).unwrap());
        assert!(matches!(listener.accept(), Ok(Accepted::Connection(_, _))));
    }

    #[test]
    fn test_address_in_use() {
        let first = SharedListener::create("127.0.0.1", 0, 16).unwrap();
        let port = first.local_addr().port();
        let err = SharedListener::create("127.0.0.1", port, 16).unwrap_err();
        match err {
            ListenError::Bind { addr, source } => {
                assert_eq!(addr.port(), port);
                assert_eq!(source.kind(), io::ErrorKind::AddrInUse);
            }
            other => panic!("expected bind error, got {other:?}"),
        }
    }

    #[test]
    fn test_ipv6_only_host_rejected() {
        let err = SharedListener::create("::1", 0, 16).unwrap_err();
        assert!(matches!(err, ListenError::InvalidAddress { .. }));
    }

    #[test]
    fn test_clamp_backlog() {
        assert_eq!(clamp_backlog(512), 512.min(libc::SOMAXCONN));
        assert_eq!(clamp_backlog(u32::MAX), libc::SOMAXCONN);
    }
}
