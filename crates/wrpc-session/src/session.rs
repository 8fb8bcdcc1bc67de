//! `Session`: owns a request, a response, and at most two outstanding
//! [`Attempt`]s — the primary and, once fired, a backup racing it.
//!
//! One internal lock (`status`) linearizes every state transition; attempt
//! completion runs off the reactor's dispatch thread via `on_attempt_ready`,
//! which only ever enqueues work (onto the session's own pending queue while
//! a thread is joining, or onto the channel's background pool otherwise) —
//! the blocking read itself happens wherever that work finally runs.

use std::collections::VecDeque;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use wrpc_balancer::LoadBalancerContext;
use wrpc_channel::Channel;
use wrpc_core::timer::CountdownTimer;
use wrpc_core::{Code, ConnectionType, Result, RpcOptions, WrpcError};
use wrpc_message::{IRequest, IResponse};
use wrpc_queue::{TaskFn, TaskId, INVALID_TASK_ID};
use wrpc_reactor::SessionId;

use crate::attempt::{Attempt, AttemptKind};
use crate::state::SessionStatus;

struct BackgroundIds {
    timeout: TaskId,
    backup: TaskId,
}

/// One request/response round trip, possibly raced against a backup attempt
/// and possibly retried, bound to a [`Channel`] for its whole life.
pub struct Session {
    id: u64,
    channel: Arc<Channel>,
    request: Mutex<Box<dyn IRequest>>,
    response: Mutex<Option<Box<dyn IResponse>>>,
    options: RpcOptions,
    total_timer: CountdownTimer,
    status: Mutex<SessionStatus>,
    terminal_code: Mutex<Code>,
    cond: Condvar,
    ctx: Mutex<LoadBalancerContext>,
    primary: Mutex<Option<Arc<Attempt>>>,
    backup: Mutex<Option<Arc<Attempt>>>,
    callback: Mutex<Option<Box<dyn FnOnce(Code) + Send>>>,
    pending: Mutex<VecDeque<TaskFn>>,
    joining: AtomicBool,
    background_ids: Mutex<BackgroundIds>,
    self_ref: Mutex<Option<Arc<Session>>>,
}

impl Session {
    /// Builds a session bound to `channel`. Nothing happens — no endpoint is
    /// chosen, no connection dialed — until [`Session::submit`].
    pub fn new(channel: Arc<Channel>, request: Box<dyn IRequest>, options: RpcOptions) -> Arc<Self> {
        let hash_code = request.hash_code();
        let id = crate::addresser::next_id();
        Arc::new(Self {
            id,
            channel,
            request: Mutex::new(request),
            response: Mutex::new(None),
            total_timer: CountdownTimer::new((options.total_timeout_ms as i64) * 1_000),
            options,
            status: Mutex::new(SessionStatus::Init),
            terminal_code: Mutex::new(Code::Unknown),
            cond: Condvar::new(),
            ctx: Mutex::new(LoadBalancerContext::new(hash_code, id.to_string())),
            primary: Mutex::new(None),
            backup: Mutex::new(None),
            callback: Mutex::new(None),
            pending: Mutex::new(VecDeque::new()),
            joining: AtomicBool::new(false),
            background_ids: Mutex::new(BackgroundIds {
                timeout: INVALID_TASK_ID,
                backup: INVALID_TASK_ID,
            }),
            self_ref: Mutex::new(None),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock().unwrap()
    }

    /// Issues the primary attempt, retrying synchronously on this thread
    /// while the error is retryable and the retry budget allows; schedules
    /// the total-timeout and backup-request background tasks once it lands.
    /// Returns the primary attempt's failure if it never manages to issue
    /// one — this says nothing about whether the RPC itself eventually
    /// succeeds, only whether a request is now in flight. Call [`Session::join`]
    /// for the outcome.
    pub fn submit(self: &Arc<Self>) -> Result<()> {
        {
            let mut status = self.status.lock().unwrap();
            if !matches!(*status, SessionStatus::Init | SessionStatus::Submitting) {
                return Err(WrpcError::new(Code::InvalidArgument));
            }
            *status = SessionStatus::Running;
        }
        crate::addresser::register(self.id, self);

        let outcome = match self.issue_attempt(AttemptKind::Primary) {
            Ok(()) => Ok(()),
            Err(err) if err.code.is_retryable() => self
                .issue_with_retry(AttemptKind::Primary, err.code)
                .map_err(WrpcError::new),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {
                self.schedule_timeout_and_backup();
                Ok(())
            }
            Err(err) => {
                self.finalize(err.code);
                Err(err)
            }
        }
    }

    /// Like [`Session::submit`] but runs a callback exactly once on terminal
    /// transition instead of requiring the caller to [`Session::join`].
    pub fn submit_with_callback(self: &Arc<Self>, callback: impl FnOnce(Code) + Send + 'static) -> Result<()> {
        *self.callback.lock().unwrap() = Some(Box::new(callback));
        self.submit()
    }

    /// Runs [`Session::submit`] on a background worker and returns immediately.
    pub fn submit_async(self: &Arc<Self>) {
        *self.status.lock().unwrap() = SessionStatus::Submitting;
        let this = Arc::clone(self);
        self.channel.background().spawn(Box::new(move || {
            let _ = this.submit();
        }));
    }

    /// Blocks until the session reaches a terminal state, running any work
    /// the reactor has queued for it on this thread in the meantime so a
    /// lone caller still makes progress without a background pool. Returns
    /// the terminal code.
    pub fn join(self: &Arc<Self>) -> Code {
        self.joining.store(true, Ordering::Release);
        let mut guard = self.status.lock().unwrap();
        loop {
            if guard.is_terminal() {
                break;
            }
            drop(guard);
            while let Some(task) = self.pending.lock().unwrap().pop_front() {
                task();
            }
            guard = self.status.lock().unwrap();
            if guard.is_terminal() {
                break;
            }
            let (next, _timed_out) = self.cond.wait_timeout(guard, Duration::from_millis(20)).unwrap();
            guard = next;
        }
        drop(guard);
        self.joining.store(false, Ordering::Release);
        *self.terminal_code.lock().unwrap()
    }

    /// Keeps the session alive past the caller's own handle so completion
    /// (and any callback) still runs without anyone joining it.
    pub fn detach(self: &Arc<Self>) {
        *self.self_ref.lock().unwrap() = Some(Arc::clone(self));
    }

    /// Cancels a non-terminal session. `run_callback` controls whether the
    /// callback registered via [`Session::submit_with_callback`], if any,
    /// still runs. Returns whether cancellation actually happened (false if
    /// the session was already terminal).
    pub fn cancel(self: &Arc<Self>, run_callback: bool) -> bool {
        {
            let status = self.status.lock().unwrap();
            if status.is_terminal() {
                return false;
            }
        }
        self.abandon_all(Code::Canceled);
        if !run_callback {
            *self.callback.lock().unwrap() = None;
        }
        self.finalize(Code::Canceled);
        true
    }

    /// Takes the response out once the session has succeeded. `None` before
    /// success, and on every subsequent call (it is taken, not borrowed).
    pub fn take_response(&self) -> Option<Box<dyn IResponse>> {
        self.response.lock().unwrap().take()
    }

    fn retry_count(&self) -> u32 {
        self.ctx.lock().unwrap().retry_count
    }

    /// Milliseconds left before the total deadline, or `-1` if unbounded.
    fn remaining_ms(&self) -> i32 {
        let remain_us = self.total_timer.remain();
        if remain_us < 0 {
            -1
        } else {
            (remain_us / 1_000).max(0) as i32
        }
    }

    /// The tighter of a per-call bound and the total deadline; either side
    /// being unbounded (negative) defers to the other.
    fn effective_timeout_ms(&self, per_call_ms: i32) -> i32 {
        let remain = self.remaining_ms();
        match (per_call_ms < 0, remain < 0) {
            (true, true) => -1,
            (true, false) => remain,
            (false, true) => per_call_ms,
            (false, false) => per_call_ms.min(remain),
        }
    }

    /// Selects an endpoint, dials it, writes the request, and arms the
    /// reactor for the response — everything "issuing" an attempt means
    /// short of actually reading back a result. Does not touch
    /// `ctx.retry_count`; callers decide if and when that advances.
    fn issue_attempt(self: &Arc<Self>, kind: AttemptKind) -> Result<()> {
        let endpoint = {
            let mut ctx = self.ctx.lock().unwrap();
            let endpoint = self.channel.select_endpoint(&mut ctx)?;
            ctx.record_tried(endpoint);
            endpoint
        };
        let attempt = Attempt::new(kind, endpoint, self);

        let connect_timeout_ms = self.effective_timeout_ms(self.options.connect_timeout_ms);
        let mut conn = match self.channel.fetch_connection(endpoint, connect_timeout_ms) {
            Ok(conn) => conn,
            Err(err) => {
                self.channel.submit_feedback(self.retry_count(), attempt.feedback(err.code));
                return Err(err);
            }
        };
        attempt.record_connect_done();

        let write_timeout_ms = self.remaining_ms();
        let write_result = self.request.lock().unwrap().write_to(&mut conn, write_timeout_ms);
        if let Err(err) = write_result {
            self.channel.submit_feedback(self.retry_count(), attempt.feedback(err.code));
            self.channel.giveback_connection(endpoint, conn, true);
            return Err(err);
        }
        attempt.record_write_done();

        let fd = conn.as_raw_fd();
        attempt.set_connection(conn);
        if attempt.listen(self.id, fd).is_err() {
            let conn = attempt.take_connection();
            self.channel.submit_feedback(self.retry_count(), attempt.feedback(Code::EpollFail));
            if let Some(conn) = conn {
                self.channel.giveback_connection(endpoint, conn, true);
            }
            return Err(WrpcError::new(Code::EpollFail));
        }

        match kind {
            AttemptKind::Primary => *self.primary.lock().unwrap() = Some(Arc::clone(&attempt)),
            AttemptKind::Backup => *self.backup.lock().unwrap() = Some(Arc::clone(&attempt)),
        }

        // The session may have gone terminal (e.g. `cancel`) while this
        // attempt was being issued; if so, it just lost a narrow race and is
        // torn down immediately rather than left listening forever.
        if self.status.lock().unwrap().is_terminal() {
            self.discard_attempt(&attempt, Code::Canceled);
        }
        Ok(())
    }

    /// Re-issues `kind` until it lands, the failure stops being retryable,
    /// the retry budget runs out, or the total deadline passes — whichever
    /// comes first. `last_code` is the failure that made the caller decide
    /// to retry in the first place, carried through in case the budget is
    /// already exhausted on entry.
    fn issue_with_retry(self: &Arc<Self>, kind: AttemptKind, mut last_code: Code) -> std::result::Result<(), Code> {
        loop {
            let can_retry = {
                let ctx = self.ctx.lock().unwrap();
                ctx.retry_count < self.options.max_retry_num
            } && !self.total_timer.is_expired();
            if !can_retry {
                return Err(last_code);
            }
            self.ctx.lock().unwrap().retry_count += 1;
            match self.issue_attempt(kind) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    last_code = err.code;
                    if !err.code.is_retryable() {
                        return Err(last_code);
                    }
                }
            }
        }
    }

    fn schedule_timeout_and_backup(self: &Arc<Self>) {
        let mut ids = self.background_ids.lock().unwrap();
        if self.options.total_timeout_ms >= 0 {
            let this = Arc::clone(self);
            let delay_us = (self.options.total_timeout_ms as i64) * 1_000;
            ids.timeout = self
                .channel
                .background()
                .schedule_delay(delay_us, Box::new(move || this.on_total_timeout()));
        }
        if self.options.backup_request_timeout_ms > 0 {
            let delay_ms = if self.options.total_timeout_ms >= 0 {
                self.options.backup_request_timeout_ms.min(self.options.total_timeout_ms)
            } else {
                self.options.backup_request_timeout_ms
            };
            let this = Arc::clone(self);
            ids.backup = self
                .channel
                .background()
                .schedule_delay((delay_ms as i64) * 1_000, Box::new(move || this.fire_backup()));
        }
    }

    /// Runs on a background worker at `backup_request_timeout_ms` after
    /// submit. Fires a second attempt at a (possibly different) endpoint if
    /// the session is still running and the retry budget allows it; does
    /// nothing otherwise.
    fn fire_backup(self: &Arc<Self>) {
        if self.status.lock().unwrap().is_terminal() {
            return;
        }
        if self.backup.lock().unwrap().is_some() {
            return;
        }
        {
            let ctx = self.ctx.lock().unwrap();
            if ctx.retry_count >= self.options.max_retry_num {
                return;
            }
        }
        self.ctx.lock().unwrap().retry_count += 1;
        if let Err(_err) = self.issue_attempt(AttemptKind::Backup) {
            #[cfg(feature = "tracing")]
            tracing::debug!(session = self.id, code = ?_err.code, "backup attempt failed to issue");
        }
    }

    fn on_total_timeout(self: &Arc<Self>) {
        if self.status.lock().unwrap().is_terminal() {
            return;
        }
        self.abandon_all(Code::Timeout);
        self.finalize(Code::Timeout);
    }

    /// Hands a readiness event to the session's own work queue. Called from
    /// the reactor's dispatch thread, so it must never block: the actual
    /// read happens wherever this closure eventually runs — inline in
    /// [`Session::join`] if someone is joining, otherwise on a background
    /// worker.
    pub(crate) fn on_attempt_ready(self: &Arc<Self>, session_id: SessionId, attempt: Arc<Attempt>, readable: bool) {
        debug_assert_eq!(session_id, self.id);
        let this = Arc::clone(self);
        let work: TaskFn = Box::new(move || this.handle_attempt_ready(attempt, readable));
        if self.joining.load(Ordering::Acquire) {
            self.pending.lock().unwrap().push_back(work);
            self.cond.notify_all();
        } else {
            self.channel.background().spawn(work);
        }
    }

    fn handle_attempt_ready(self: &Arc<Self>, attempt: Arc<Attempt>, readable: bool) {
        if self.status.lock().unwrap().is_terminal() {
            attempt.abandon();
            return;
        }
        attempt.unlisten();
        if self.total_timer.is_expired() {
            self.on_attempt_error(&attempt, Code::Timeout);
            return;
        }
        if !readable {
            self.on_attempt_error(&attempt, Code::Disconnected);
            return;
        }
        let Some(mut conn) = attempt.take_connection() else {
            return;
        };
        let timeout_ms = self.remaining_ms();
        let mut response = self.channel.new_response();
        match response.read_from(&mut conn, timeout_ms) {
            Ok(()) => {
                if !attempt.try_finish() {
                    // Lost a race with cancel/timeout between unlisten and here.
                    self.channel.giveback_connection(attempt.endpoint, conn, true);
                    return;
                }
                self.channel.submit_feedback(self.retry_count(), attempt.feedback(Code::Success));
                let close = matches!(self.channel.options().connection_type, ConnectionType::Short);
                self.channel.giveback_connection(attempt.endpoint, conn, close);
                *self.response.lock().unwrap() = Some(response);
                self.on_sibling_won(&attempt);
                self.finalize(Code::Success);
            }
            Err(err) => {
                self.channel.giveback_connection(attempt.endpoint, conn, true);
                self.on_attempt_error(&attempt, err.code);
            }
        }
    }

    /// Claims `attempt` for completion, reports feedback, and either retries
    /// (if the budget and deadline allow) or fails the session outright if
    /// no sibling attempt is still in flight.
    fn on_attempt_error(self: &Arc<Self>, attempt: &Arc<Attempt>, code: Code) {
        if !attempt.try_finish() {
            return;
        }
        self.channel.submit_feedback(self.retry_count(), attempt.feedback(code));
        self.clear_attempt_slot(attempt);

        if self.status.lock().unwrap().is_terminal() {
            return;
        }

        if code.is_retryable() {
            if let Err(final_code) = self.issue_with_retry(attempt.kind, code) {
                self.on_issue_failed(attempt.kind, final_code);
            }
        } else {
            self.on_issue_failed(attempt.kind, code);
        }
    }

    /// Fails the session with `code` unless the sibling slot still holds a
    /// live attempt, in which case the session waits on it instead.
    fn on_issue_failed(self: &Arc<Self>, kind: AttemptKind, code: Code) {
        let sibling_alive = match kind {
            AttemptKind::Primary => self.backup.lock().unwrap().as_ref().is_some_and(|a| !a.is_finished()),
            AttemptKind::Backup => self.primary.lock().unwrap().as_ref().is_some_and(|a| !a.is_finished()),
        };
        if !sibling_alive {
            self.finalize(code);
        }
    }

    /// Cancels whichever attempt did not win with `BackupSuccess`, closing
    /// its connection.
    fn on_sibling_won(&self, winner: &Arc<Attempt>) {
        let loser = {
            let mut primary = self.primary.lock().unwrap();
            if primary.as_ref().is_some_and(|p| Arc::ptr_eq(p, winner)) {
                *primary = None;
                drop(primary);
                self.backup.lock().unwrap().take()
            } else {
                drop(primary);
                let mut backup = self.backup.lock().unwrap();
                if backup.as_ref().is_some_and(|b| Arc::ptr_eq(b, winner)) {
                    *backup = None;
                }
                drop(backup);
                self.primary.lock().unwrap().take()
            }
        };
        if let Some(loser) = loser {
            self.discard_attempt(&loser, Code::BackupSuccess);
        }
    }

    fn clear_attempt_slot(&self, attempt: &Arc<Attempt>) {
        let mut primary = self.primary.lock().unwrap();
        if primary.as_ref().is_some_and(|p| Arc::ptr_eq(p, attempt)) {
            *primary = None;
            return;
        }
        drop(primary);
        let mut backup = self.backup.lock().unwrap();
        if backup.as_ref().is_some_and(|b| Arc::ptr_eq(b, attempt)) {
            *backup = None;
        }
    }

    /// Tears down one attempt: de-arms the reactor, reports `code` as
    /// feedback, and closes its connection (if it still has one). A no-op if
    /// the attempt already finished through another path.
    fn discard_attempt(&self, attempt: &Arc<Attempt>, code: Code) {
        if !attempt.try_finish() {
            return;
        }
        attempt.unlisten();
        self.channel.submit_feedback(self.retry_count(), attempt.feedback(code));
        if let Some(conn) = attempt.take_connection() {
            self.channel.giveback_connection(attempt.endpoint, conn, true);
        }
    }

    fn abandon_all(&self, code: Code) {
        if let Some(attempt) = self.primary.lock().unwrap().take() {
            self.discard_attempt(&attempt, code);
        }
        if let Some(attempt) = self.backup.lock().unwrap().take() {
            self.discard_attempt(&attempt, code);
        }
    }

    fn cancel_background_ids(&self) {
        let ids = self.background_ids.lock().unwrap();
        self.channel.background().cancel(ids.timeout);
        self.channel.background().cancel(ids.backup);
    }

    /// The single idempotent path to a terminal state: records the code,
    /// cancels every outstanding background task id, removes the session
    /// from the addresser, runs the callback (if any) exactly once, wakes
    /// any joiner, and drops the session's self-reference.
    fn finalize(self: &Arc<Self>, code: Code) {
        {
            let mut status = self.status.lock().unwrap();
            if status.is_terminal() {
                return;
            }
            *status = match code {
                Code::Success => SessionStatus::Success,
                Code::Timeout => SessionStatus::Timeout,
                Code::Canceled => SessionStatus::Canceled,
                _ => SessionStatus::Failed,
            };
        }
        *self.terminal_code.lock().unwrap() = code;
        self.cancel_background_ids();
        crate::addresser::unregister(self.id);
        if let Some(cb) = self.callback.lock().unwrap().take() {
            cb(code);
        }
        self.cond.notify_all();
        *self.self_ref.lock().unwrap() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use wrpc_core::ChannelOptions;
    use wrpc_endpoint::{Endpoint, EndpointSet};
    use wrpc_message::redis::RedisRequest;
    use wrpc_worker::BackgroundRuntime;

    fn redis_options() -> ChannelOptions {
        ChannelOptions {
            protocol: "redis".to_string(),
            load_balancer: "rr".to_string(),
            ..Default::default()
        }
    }

    fn ping_request() -> Box<dyn IRequest> {
        let mut req = RedisRequest::new();
        req.set_command("PING", Vec::<String>::new());
        Box::new(req)
    }

    #[test]
    fn submit_against_a_dead_port_fails_fast_with_no_retry_budget() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let channel = Channel::with_runtime(&format!("list://{addr}"), redis_options(), BackgroundRuntime::start(1)).unwrap();

        let mut options = RpcOptions::default();
        options.connect_timeout_ms = 200;
        let session = Session::new(channel, ping_request(), options);
        let err = session.submit().unwrap_err();
        assert_eq!(err.code, Code::ConnectFail);
        assert_eq!(session.status(), SessionStatus::Failed);
    }

    #[test]
    fn successful_round_trip_reaches_success_through_join() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 256];
            let n = sock.read(&mut buf).unwrap();
            assert!(n > 0);
            sock.write_all(b"+PONG\r\n").unwrap();
        });

        let mut set = EndpointSet::new();
        set.insert(Endpoint::new(addr.ip(), addr.port()));
        let channel = Channel::with_endpoints(set, redis_options()).unwrap();

        let session = Session::new(channel, ping_request(), RpcOptions::default());
        session.submit().unwrap();
        let code = session.join();
        assert_eq!(code, Code::Success);
        assert!(session.take_response().is_some());

        server.join().unwrap();
    }

    #[test]
    fn cancel_before_submit_completes_is_a_no_op_after_terminal() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let channel = Channel::with_runtime(&format!("list://{addr}"), redis_options(), BackgroundRuntime::start(1)).unwrap();
        let session = Session::new(channel, ping_request(), RpcOptions::default());
        assert!(session.cancel(true));
        assert!(!session.cancel(true));
    }
}
