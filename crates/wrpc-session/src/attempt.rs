//! One in-flight try at one endpoint: a connection, a reactor registration,
//! and the timing data that becomes a [`FeedbackInfo`] once it finishes.
//!
//! An attempt never blocks the reactor thread. [`Attempt::listen`] arms the
//! connection's fd for exactly one readiness event; [`ReadinessListener::on_readable`]
//! and [`ReadinessListener::on_error`] fire on the reactor's dispatch thread and
//! must return quickly, so they only hand the event off to the owning session's
//! work queue (`Session::on_attempt_ready`), which does the actual blocking
//! read from whatever thread drains it.

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use mio::Token;

use wrpc_connection::Connection;
use wrpc_core::timer::{now_micros, Microseconds};
use wrpc_core::{Code, FeedbackInfo};
use wrpc_endpoint::Endpoint;
use wrpc_reactor::{ReadinessListener, Reactor, SessionId};

use crate::session::Session;

/// Whether an attempt is the session's first try at an endpoint or a backup
/// fired alongside a primary that hasn't answered in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttemptKind {
    Primary,
    Backup,
}

struct Armed {
    reactor: Arc<Reactor>,
    token: Token,
}

/// One try at one endpoint. Always held behind an `Arc` so a reactor
/// registration can hold a [`Weak`] back to it without keeping it alive past
/// its session.
pub(crate) struct Attempt {
    pub(crate) kind: AttemptKind,
    pub(crate) endpoint: Endpoint,
    session: Weak<Session>,
    self_weak: Weak<Attempt>,
    /// Claimed exactly once by whichever of {success, error, total-timeout,
    /// cancel} reaches this attempt first; later claimants are no-ops.
    finished: AtomicBool,
    connection: Mutex<Option<Connection>>,
    armed: Mutex<Option<Armed>>,
    start_us: Microseconds,
    connect_cost_us: Mutex<Microseconds>,
    write_cost_us: Mutex<Microseconds>,
    /// How many times `issue_rpc`-equivalent work has run on this attempt.
    /// Always 1 for an attempt that only ever issues once; a session never
    /// reissues the same `Attempt` today, but the counter exists so a future
    /// per-attempt retry strategy (rather than spawning a new `Attempt`) has
    /// somewhere to record it, and so feedback always reports a real count.
    try_count: AtomicU32,
}

impl Attempt {
    pub(crate) fn new(kind: AttemptKind, endpoint: Endpoint, session: &Arc<Session>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            kind,
            endpoint,
            session: Arc::downgrade(session),
            self_weak: weak.clone(),
            finished: AtomicBool::new(false),
            connection: Mutex::new(None),
            armed: Mutex::new(None),
            start_us: now_micros(),
            connect_cost_us: Mutex::new(0),
            write_cost_us: Mutex::new(0),
            try_count: AtomicU32::new(1),
        })
    }

    pub(crate) fn is_backup(&self) -> bool {
        matches!(self.kind, AttemptKind::Backup)
    }

    pub(crate) fn set_connection(&self, conn: Connection) {
        *self.connection.lock().unwrap() = Some(conn);
    }

    /// Takes the connection back out so the caller can read from or return it
    /// to the endpoint's pool; an attempt past this point has none left to race.
    pub(crate) fn take_connection(&self) -> Option<Connection> {
        self.connection.lock().unwrap().take()
    }

    pub(crate) fn record_connect_done(&self) {
        *self.connect_cost_us.lock().unwrap() = now_micros() - self.start_us;
    }

    pub(crate) fn record_write_done(&self) {
        let connect_us = *self.connect_cost_us.lock().unwrap();
        *self.write_cost_us.lock().unwrap() = (now_micros() - self.start_us - connect_us).max(0);
    }

    /// Arms `fd` on the reactor that serves it for one readable/error event,
    /// delivered back to this attempt via [`ReadinessListener`].
    pub(crate) fn listen(self: &Arc<Self>, session_id: SessionId, fd: RawFd) -> std::io::Result<()> {
        let reactor = Arc::clone(wrpc_reactor::global().get(fd));
        let listener: Weak<dyn ReadinessListener> = self.self_weak.clone();
        let token = reactor.add_listener(session_id, fd, listener)?;
        *self.armed.lock().unwrap() = Some(Armed { reactor, token });
        Ok(())
    }

    /// Idempotent: de-arming a registration that already fired, or was never
    /// armed, is a harmless no-op.
    pub(crate) fn unlisten(&self) {
        if let Some(armed) = self.armed.lock().unwrap().take() {
            armed.reactor.remove_listener(armed.token);
        }
    }

    /// Claims this attempt for completion exactly once. A second caller (say,
    /// a reactor error event firing just after `cancel()` already won the
    /// race) sees `false` and must do nothing further.
    pub(crate) fn try_finish(&self) -> bool {
        self.finished
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// De-arms the reactor and marks the attempt finished without running
    /// session completion logic; used when a sibling attempt already won.
    pub(crate) fn abandon(&self) {
        self.try_finish();
        self.unlisten();
    }

    /// Assembles the feedback record a finished attempt reports to its
    /// channel's load balancer.
    pub(crate) fn feedback(&self, code: Code) -> FeedbackInfo {
        let total_us = (now_micros() - self.start_us).max(0);
        let connect_us = (*self.connect_cost_us.lock().unwrap()).max(0);
        let write_us = (*self.write_cost_us.lock().unwrap()).max(0);
        let read_us = (total_us - connect_us - write_us).max(0);
        FeedbackInfo {
            endpoint: self.endpoint,
            code,
            connect_cost: Duration::from_micros(connect_us as u64),
            write_cost: Duration::from_micros(write_us as u64),
            read_cost: Duration::from_micros(read_us as u64),
            total_cost: Duration::from_micros(total_us as u64),
            try_count: self.try_count.load(Ordering::Relaxed),
        }
    }
}

impl ReadinessListener for Attempt {
    fn on_readable(&self, session_id: SessionId, _fd: RawFd) {
        self.dispatch(session_id, true);
    }

    fn on_error(&self, session_id: SessionId, _fd: RawFd) {
        self.dispatch(session_id, false);
    }
}

impl Attempt {
    /// Hands the readiness event to the owning session rather than acting on
    /// it here — this runs on the reactor's dispatch thread, which must never
    /// block on socket I/O.
    fn dispatch(&self, session_id: SessionId, readable: bool) {
        let Some(this) = self.self_weak.upgrade() else {
            return;
        };
        let Some(session) = self.session.upgrade() else {
            return;
        };
        session.on_attempt_ready(session_id, this, readable);
    }
}
