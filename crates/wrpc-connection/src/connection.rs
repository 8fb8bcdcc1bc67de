use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use wrpc_core::timer::CountdownTimer;
use wrpc_core::{Code, Result, WrpcError};
use wrpc_endpoint::Endpoint;
use wrpc_message::{Readable, Writable};

/// Where a [`Connection`] is in its lifecycle. Only informational: nothing in
/// this crate refuses an operation based on it, since ownership already makes
/// a read/write on a dropped socket impossible to express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Created,
    Connected,
    Closed,
}

/// One TCP socket to one [`Endpoint`]. There is no internal lock: the attempt
/// that holds `&mut Connection` is, by construction, the only thread doing I/O
/// on it at that moment.
pub struct Connection {
    endpoint: Endpoint,
    stream: TcpStream,
    state: ConnectionState,
}

fn to_duration(timeout_ms: i32) -> Option<Duration> {
    match timeout_ms {
        ms if ms < 0 => None,
        0 => Some(Duration::from_nanos(1)),
        ms => Some(Duration::from_millis(ms as u64)),
    }
}

impl Connection {
    /// Dials `endpoint`, blocking for at most `connect_timeout_ms` (negative
    /// means unbounded).
    pub fn connect(endpoint: Endpoint, connect_timeout_ms: i32) -> Result<Self> {
        let addr = endpoint.to_socket_addr();
        let stream = match to_duration(connect_timeout_ms) {
            Some(d) => TcpStream::connect_timeout(&addr, d),
            None => TcpStream::connect(addr),
        }
        .map_err(|e| WrpcError::with_detail(Code::ConnectFail, e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| WrpcError::with_detail(Code::ConnectFail, e.to_string()))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(%endpoint, "connected");
        #[cfg(feature = "metrics")]
        metrics::counter!("wrpc_connections_created_total").increment(1);

        Ok(Self {
            endpoint,
            stream,
            state: ConnectionState::Connected,
        })
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Marks the connection closed. The socket itself closes when the
    /// underlying `TcpStream` drops; this just updates the bookkeeping state
    /// so a pool can tell a stale handle apart from a live one.
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
        #[cfg(feature = "metrics")]
        metrics::counter!("wrpc_connections_closed_total").increment(1);
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.stream.set_nonblocking(nonblocking)
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

impl Readable for Connection {
    /// Loops until `buf` is full, the peer closes (a short, non-empty read
    /// followed by EOF), or the deadline passes — mirroring `readn`'s
    /// poll-and-read loop rather than handing back whatever one `read(2)`
    /// syscall happened to deliver. The remaining timeout is recomputed
    /// before every iteration, so a reply split across several TCP segments
    /// still respects the original deadline instead of restarting it per
    /// segment.
    fn read(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize> {
        let deadline = CountdownTimer::new((timeout_ms as i64).saturating_mul(1_000));
        let mut filled = 0;
        while filled < buf.len() {
            let remaining_ms = if timeout_ms < 0 {
                -1
            } else {
                let remain_us = deadline.remain();
                if remain_us <= 0 {
                    return Err(WrpcError::new(Code::Timeout));
                }
                remain_us.div_ceil(1_000) as i32
            };
            self.stream
                .set_read_timeout(to_duration(remaining_ms))
                .map_err(|e| WrpcError::with_detail(Code::RecvFail, e.to_string()))?;
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => return Ok(filled),
                Ok(n) => filled += n,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    return Err(WrpcError::new(Code::Timeout));
                }
                Err(e) => return Err(WrpcError::with_detail(Code::RecvFail, e.to_string())),
            }
        }
        Ok(filled)
    }
}

impl Writable for Connection {
    fn write(&mut self, buf: &[u8], timeout_ms: i32) -> Result<usize> {
        self.stream
            .set_write_timeout(to_duration(timeout_ms))
            .map_err(|e| WrpcError::with_detail(Code::SendFail, e.to_string()))?;
        match self.stream.write(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Err(WrpcError::new(Code::Timeout))
            }
            Err(e) => Err(WrpcError::with_detail(Code::SendFail, e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn connects_to_a_listening_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = Endpoint::new(listener.local_addr().unwrap().ip(), listener.local_addr().unwrap().port());
        let conn = Connection::connect(endpoint, 1_000).unwrap();
        assert!(conn.is_connected());
        assert_eq!(conn.endpoint(), endpoint);
    }

    #[test]
    fn connect_fails_fast_against_a_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let endpoint = Endpoint::new(addr.ip(), addr.port());
        let err = Connection::connect(endpoint, 200).unwrap_err();
        assert_eq!(err.code, Code::ConnectFail);
    }

    #[test]
    fn read_times_out_when_peer_sends_nothing() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let endpoint = Endpoint::new(addr.ip(), addr.port());
        let _accept = std::thread::spawn(move || listener.accept().unwrap());
        let mut conn = Connection::connect(endpoint, 1_000).unwrap();
        let mut buf = [0u8; 16];
        let err = conn.read(&mut buf, 50).unwrap_err();
        assert_eq!(err.code, Code::Timeout);
    }

    #[test]
    fn write_then_read_round_trips_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let endpoint = Endpoint::new(addr.ip(), addr.port());
        let server = std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            sock.read_exact(&mut buf).unwrap();
            sock.write_all(&buf).unwrap();
        });
        let mut conn = Connection::connect(endpoint, 1_000).unwrap();
        conn.write_all(b"hello", 1_000).unwrap();
        let mut buf = [0u8; 5];
        let mut read = 0;
        while read < buf.len() {
            read += conn.read(&mut buf[read..], 1_000).unwrap();
        }
        assert_eq!(&buf, b"hello");
        server.join().unwrap();
    }

    #[test]
    fn read_fills_the_buffer_across_multiple_tcp_segments() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let endpoint = Endpoint::new(addr.ip(), addr.port());
        let server = std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            sock.write_all(b"hello").unwrap();
            std::thread::sleep(Duration::from_millis(50));
            sock.write_all(b"world").unwrap();
        });
        let mut conn = Connection::connect(endpoint, 1_000).unwrap();
        let mut buf = [0u8; 10];
        // A single `read` call must loop internally until all 10 bytes have
        // arrived, even though the peer wrote them as two separate segments.
        let n = conn.read(&mut buf, 1_000).unwrap();
        assert_eq!(n, 10);
        assert_eq!(&buf, b"helloworld");
        server.join().unwrap();
    }

    #[test]
    fn read_times_out_if_only_a_partial_reply_ever_arrives() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let endpoint = Endpoint::new(addr.ip(), addr.port());
        let server = std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            sock.write_all(b"hi").unwrap();
            // Hold the connection open without ever sending the rest.
            std::thread::sleep(Duration::from_millis(300));
        });
        let mut conn = Connection::connect(endpoint, 1_000).unwrap();
        let mut buf = [0u8; 10];
        let err = conn.read(&mut buf, 100).unwrap_err();
        assert_eq!(err.code, Code::Timeout);
        server.join().unwrap();
    }

    #[test]
    fn close_marks_state_without_dropping_the_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = Endpoint::new(listener.local_addr().unwrap().ip(), listener.local_addr().unwrap().port());
        let mut conn = Connection::connect(endpoint, 1_000).unwrap();
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.is_connected());
    }
}
