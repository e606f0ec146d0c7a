//! Connection handlers
//!
//! A worker owns an accepted connection for exactly one handler call. The
//! handler reads, responds and closes; the worker never looks at the bytes.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

/// Body served by [`CannedResponse`]
pub const HELLO_BODY: &[u8] = b"<html><body>Hello!</body></html>";

/// Upper bound on input discarded after the response is written.
const MAX_DISCARD: usize = 64 * 1024;

/// Produces a response for one accepted connection and closes it.
///
/// The stream is already in blocking mode. Returning `Err` terminates the
/// calling worker process.
pub trait ConnectionHandler {
    fn handle(&self, conn: TcpStream, peer: SocketAddr) -> io::Result<()>;
}

impl<H: ConnectionHandler + ?Sized> ConnectionHandler for &H {
    fn handle(&self, conn: TcpStream, peer: SocketAddr) -> io::Result<()> {
        (**self).handle(conn, peer)
    }
}

/// Build the fixed `200 OK` response served to every client.
pub fn make_hello_response() -> Vec<u8> {
    let mut resp = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Length: {}\r\n\
         Content-Type: text/html\r\n\
         Connection: close\r\n\
         \r\n",
        HELLO_BODY.len()
    )
    .into_bytes();
    resp.extend_from_slice(HELLO_BODY);
    resp
}

/// Reads one chunk of the request, ignores it, answers with a fixed response.
///
/// No parsing, no keep-alive: one read, one response, close.
#[derive(Debug, Clone)]
pub struct CannedResponse {
    response: Vec<u8>,
    read_limit: usize,
}

impl CannedResponse {
    pub fn new(read_limit: usize) -> Self {
        Self {
            response: make_hello_response(),
            read_limit,
        }
    }

    pub fn response(&self) -> &[u8] {
        &self.response
    }

    pub fn read_limit(&self) -> usize {
        self.read_limit
    }
}

impl Default for CannedResponse {
    fn default() -> Self {
        Self::new(crate::config::defaults::READ_LIMIT)
    }
}

impl ConnectionHandler for CannedResponse {
    fn handle(&self, mut conn: TcpStream, peer: SocketAddr) -> io::Result<()> {
        let mut buf = vec![0u8; self.read_limit];
        let n = loop {
            match conn.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        tracing::debug!(%peer, bytes = n, data = ?String::from_utf8_lossy(&buf[..n]), "received");

        conn.write_all(&self.response)?;
        conn.flush()?;
        tracing::debug!(%peer, data = ?String::from_utf8_lossy(&self.response), "sent");

        close_gracefully(conn);
        Ok(())
    }
}

/// Half-close and drop input that already arrived, so close(2) does not
/// turn unread request bytes into a RST that races the response.
///
/// Never blocks: the stream is switched back to non-blocking first.
fn close_gracefully(mut conn: TcpStream) {
    if let Err(e) = conn.shutdown(Shutdown::Write) {
        tracing::debug!(error = %e, "half-close failed");
    }
    if let Err(e) = conn.set_nonblocking(true) {
        tracing::debug!(error = %e, "cannot drain connection");
        return;
    }
    let mut scratch = [0u8; 1024];
    let mut discarded = 0;
    while discarded < MAX_DISCARD {
        match conn.read(&mut scratch) {
            Ok(0) | Err(_) => break,
            Ok(n) => discarded += n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    const EXPECTED: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Length: 32\r\n\
Content-Type: text/html\r\n\
Connection: close\r\n\
\r\n\
<html><body>Hello!</body></html>";

    /// Run the handler against one loopback client that sends `request`.
    fn exchange(request: Vec<u8>) -> Vec<u8> {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(&request).unwrap();
            let mut response = Vec::new();
            stream.read_to_end(&mut response).unwrap();
            response
        });

        let (conn, peer) = listener.accept().unwrap();
        CannedResponse::default().handle(conn, peer).unwrap();
        client.join().unwrap()
    }

    #[test]
    fn test_hello_response_shape() {
        assert_eq!(HELLO_BODY.len(), 32);
        assert_eq!(make_hello_response(), EXPECTED);
    }

    #[test]
    fn test_responds_to_request() {
        let response = exchange(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n".to_vec());
        assert_eq!(response, EXPECTED);
    }

    #[test]
    fn test_oversized_request_gets_same_response() {
        let response = exchange(vec![b'x'; 2048]);
        assert_eq!(response, EXPECTED);
    }

    #[test]
    fn test_empty_request() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.shutdown(Shutdown::Write).unwrap();
            let mut response = Vec::new();
            stream.read_to_end(&mut response).unwrap();
            response
        });

        let (conn, peer) = listener.accept().unwrap();
        CannedResponse::default().handle(conn, peer).unwrap();
        assert_eq!(client.join().unwrap(), EXPECTED);
    }

    #[test]
    fn test_read_limit() {
        let handler = CannedResponse::new(16);
        assert_eq!(handler.read_limit(), 16);
        assert_eq!(handler.response(), EXPECTED);
    }
}
