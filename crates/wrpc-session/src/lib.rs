//! The client-side RPC session state machine: one [`Session`] per call,
//! carrying it through endpoint selection, connect, write, a racing backup
//! attempt, retries, and exactly one terminal transition.

mod addresser;
mod attempt;
mod session;
mod state;

pub use session::Session;
pub use state::SessionStatus;

/// Looks up a still-live session by the id handed out at [`Session::new`],
/// for callers (e.g. a wire protocol demultiplexer) that only have the id on
/// hand and need to get back to the session that owns it.
pub fn lookup_session(id: u64) -> Option<std::sync::Arc<Session>> {
    addresser::lookup(id)
}
