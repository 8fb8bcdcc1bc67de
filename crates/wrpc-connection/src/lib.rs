//! A blocking stream-socket wrapper with a per-call deadline, and a bounded
//! per-endpoint pool of idle connections built on top of it.
//!
//! [`Connection`] owns exactly one [`TcpStream`](std::net::TcpStream): the
//! borrowing attempt is the only thread ever allowed to touch it, which Rust's
//! ownership rules enforce for free (no internal lock needed). A
//! connection moves through `Created -> Connected -> Closed`; only `Connected`
//! connections are ever handed back to a pool.
//!
//! [`ConnectionPool`] is a bounded ring of idle, already-`Connected`
//! connections for one endpoint. `fetch` pops a cached connection or dials a
//! fresh one; `give_back` either returns a still-good connection to the ring
//! (if under capacity) or drops it — give back closes if full.

mod connection;
mod pool;

pub use connection::{Connection, ConnectionState};
pub use pool::ConnectionPool;
