//! Process-wide `session id -> weak session handle` table.
//!
//! The reactor callback path already carries its own `Weak` straight to the
//! owning [`crate::Attempt`] (see `attempt.rs`), so dispatch never goes
//! through this table — it exists so nothing outside the reactor path (a
//! future admin endpoint, a test) needs its own bookkeeping to ask "is
//! session N still around?" without extending its lifetime. A session
//! registers itself when it starts running and removes itself on terminal
//! transition; both operations are idempotent, and ids are never reused for
//! the lifetime of the process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, Weak};

use crate::session::Session;

fn table() -> &'static Mutex<HashMap<u64, Weak<Session>>> {
    static TABLE: OnceLock<Mutex<HashMap<u64, Weak<Session>>>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashMap::new()))
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Issues a session id unique for the process's lifetime.
pub fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

pub fn register(id: u64, session: &std::sync::Arc<Session>) {
    table().lock().unwrap().insert(id, std::sync::Arc::downgrade(session));
}

/// Idempotent: removing an id that is not present (already removed, or never
/// registered) is a no-op.
pub fn unregister(id: u64) {
    table().lock().unwrap().remove(&id);
}

/// Looks up a still-live session by id. Returns `None` once the session has
/// dropped its strong references and been unregistered, or if it never
/// registered in the first place.
pub fn lookup(id: u64) -> Option<std::sync::Arc<Session>> {
    table().lock().unwrap().get(&id).and_then(Weak::upgrade)
}

#[cfg(test)]
pub(crate) fn registered_count() -> usize {
    table().lock().unwrap().len()
}
