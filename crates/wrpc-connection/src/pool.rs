use std::collections::VecDeque;
use std::sync::Mutex;

use wrpc_core::Result;
use wrpc_endpoint::Endpoint;

use crate::connection::Connection;

/// A bounded ring of idle, already-connected sockets for one endpoint.
///
/// `fetch` pops a cached connection if one is idle, otherwise dials a fresh
/// one. `give_back` either returns a connection to the ring (if there is
/// still room) or drops it, closing the socket. There is one pool per
/// endpoint, owned by that endpoint's wrapper in the endpoint manager.
pub struct ConnectionPool {
    endpoint: Endpoint,
    max_size: usize,
    idle: Mutex<VecDeque<Connection>>,
}

impl ConnectionPool {
    pub fn new(endpoint: Endpoint, max_size: usize) -> Self {
        Self {
            endpoint,
            max_size,
            idle: Mutex::new(VecDeque::with_capacity(max_size.min(64))),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Number of idle connections currently cached.
    pub fn idle_len(&self) -> usize {
        self.idle.lock().unwrap().len()
    }

    /// Returns a cached connection, or dials a new one if the ring is empty.
    pub fn fetch(&self, connect_timeout_ms: i32) -> Result<Connection> {
        if let Some(conn) = self.idle.lock().unwrap().pop_front() {
            #[cfg(feature = "metrics")]
            metrics::counter!("wrpc_connection_pool_hits_total").increment(1);
            return Ok(conn);
        }
        #[cfg(feature = "metrics")]
        metrics::counter!("wrpc_connection_pool_misses_total").increment(1);
        Connection::connect(self.endpoint, connect_timeout_ms)
    }

    /// Either returns `conn` to the ring, or closes it. `close` forces the
    /// close path regardless of capacity (used when the caller knows the
    /// connection is no longer usable, e.g. after a protocol error).
    pub fn give_back(&self, mut conn: Connection, close: bool) {
        if close {
            conn.close();
            return;
        }
        let mut idle = self.idle.lock().unwrap();
        if idle.len() < self.max_size {
            idle.push_back(conn);
        } else {
            conn.close();
        }
    }

    /// Drops every idle connection, closing their sockets. Called when an
    /// endpoint transitions to DEAD.
    pub fn clear(&self) {
        self.idle.lock().unwrap().clear();
    }
}
