//! A multiplexed readiness notifier: one or more dedicated threads, each owning a
//! [`mio::Poll`], route edge-triggered, one-shot read/error events to whichever
//! session registered the file descriptor.
//!
//! Registration is one-shot: once a fd fires, its listener entry is removed and
//! the fd deregistered from the OS poller. The session must call
//! [`Reactor::add_listener`] again to arm the next wait. This mirrors the
//! dedicated-poll-thread "resilient reactor thread" shape (block in the OS call
//! on its own thread, hand events to the rest of the program through a registry
//! rather than doing application work on that thread) without tying the
//! implementation to any particular async runtime: listeners are a plain
//! callback trait, invoked synchronously from the poll thread.
//!
//! Unix-only: fds are wrapped with [`mio::unix::SourceFd`], which has no
//! portable equivalent.

#![cfg(unix)]

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread::JoinHandle;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};

/// Identifies the session a readiness event belongs to; opaque to this crate.
pub type SessionId = u64;

const WAKE_TOKEN: Token = Token(usize::MAX);

/// Callback invoked (synchronously, on the reactor's dispatch thread) when a
/// registered fd becomes readable or errors out.
pub trait ReadinessListener: Send + Sync {
    fn on_readable(&self, session_id: SessionId, fd: RawFd);
    fn on_error(&self, session_id: SessionId, fd: RawFd);
}

struct Registered {
    session_id: SessionId,
    fd: RawFd,
    listener: Weak<dyn ReadinessListener>,
}

/// One dedicated poll thread and the fds currently armed on it.
pub struct Reactor {
    registry: mio::Registry,
    waker: Waker,
    listeners: Mutex<HashMap<Token, Registered>>,
    next_token: AtomicUsize,
    stop: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Reactor {
    fn start() -> io::Result<Arc<Self>> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = Waker::new(poll.registry(), WAKE_TOKEN)?;

        let reactor = Arc::new(Self {
            registry,
            waker,
            listeners: Mutex::new(HashMap::new()),
            next_token: AtomicUsize::new(0),
            stop: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        });

        let dispatch = Arc::clone(&reactor);
        let handle = std::thread::Builder::new()
            .name("wrpc-reactor".into())
            .spawn(move || dispatch.run(poll))
            .map_err(|e| io::Error::other(e.to_string()))?;
        *reactor.thread.lock().unwrap() = Some(handle);
        Ok(reactor)
    }

    fn run(&self, mut poll: Poll) {
        let mut events = Events::with_capacity(256);
        loop {
            if let Err(e) = poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                #[cfg(feature = "tracing")]
                tracing::error!(error = %e, "reactor poll failed");
                break;
            }
            if self.stop.load(Ordering::Acquire) {
                break;
            }
            for event in events.iter() {
                if event.token() == WAKE_TOKEN {
                    continue;
                }
                self.dispatch_one(event);
            }
        }
    }

    fn dispatch_one(&self, event: &mio::event::Event) {
        let entry = self.listeners.lock().unwrap().remove(&event.token());
        let Some(entry) = entry else {
            // already de-armed (e.g. the session canceled between readiness and
            // dispatch); nothing to do.
            return;
        };
        let _ = self.registry.deregister(&mut SourceFd(&entry.fd));
        let Some(listener) = entry.listener.upgrade() else {
            return;
        };
        if event.is_readable() {
            listener.on_readable(entry.session_id, entry.fd);
        } else {
            listener.on_error(entry.session_id, entry.fd);
        }
    }

    /// Arms `fd` for exactly one readable/error event, delivered to `listener`.
    /// Returns the token to pass to [`Reactor::remove_listener`] if the caller
    /// wants to cancel before the event fires.
    pub fn add_listener(
        &self,
        session_id: SessionId,
        fd: RawFd,
        listener: Weak<dyn ReadinessListener>,
    ) -> io::Result<Token> {
        let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.registry
            .register(&mut SourceFd(&fd), token, Interest::READABLE)?;
        self.listeners.lock().unwrap().insert(
            token,
            Registered {
                session_id,
                fd,
                listener,
            },
        );
        Ok(token)
    }

    /// Safe to call even if the event already fired and de-armed the listener;
    /// returns whether a still-armed listener was actually removed.
    pub fn remove_listener(&self, token: Token) -> bool {
        match self.listeners.lock().unwrap().remove(&token) {
            Some(entry) => {
                let _ = self.registry.deregister(&mut SourceFd(&entry.fd));
                true
            }
            None => false,
        }
    }

    fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        let _ = self.waker.wake();
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A fixed-size set of [`Reactor`]s; a fd is routed to one deterministically by
/// `fd % reactors.len()`, spreading poll-thread load across the pool.
pub struct ReactorPool {
    reactors: Vec<Arc<Reactor>>,
}

impl ReactorPool {
    pub fn new(num_reactors: usize) -> io::Result<Self> {
        let num_reactors = num_reactors.max(1);
        let mut reactors = Vec::with_capacity(num_reactors);
        for _ in 0..num_reactors {
            reactors.push(Reactor::start()?);
        }
        Ok(Self { reactors })
    }

    pub fn get(&self, fd: RawFd) -> &Arc<Reactor> {
        let index = (fd as usize) % self.reactors.len();
        &self.reactors[index]
    }

    pub fn len(&self) -> usize {
        self.reactors.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// The process-wide reactor pool, lazily started on first use.
pub fn global() -> &'static ReactorPool {
    static GLOBAL: OnceLock<ReactorPool> = OnceLock::new();
    GLOBAL.get_or_init(|| {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get().clamp(1, 4))
            .unwrap_or(1);
        ReactorPool::new(parallelism).expect("failed to start the global reactor pool")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct RecordingListener {
        readable: AtomicU32,
        error: AtomicU32,
    }

    impl ReadinessListener for RecordingListener {
        fn on_readable(&self, _session_id: SessionId, _fd: RawFd) {
            self.readable.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _session_id: SessionId, _fd: RawFd) {
            self.error.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn fires_exactly_once_when_data_arrives() {
        let reactor = Reactor::start().unwrap();
        let (a, b) = UnixStream::pair().unwrap();
        let listener = Arc::new(RecordingListener {
            readable: AtomicU32::new(0),
            error: AtomicU32::new(0),
        });
        let weak: Weak<dyn ReadinessListener> = Arc::downgrade(&listener) as Weak<dyn ReadinessListener>;
        reactor.add_listener(1, a.as_raw_fd(), weak).unwrap();

        b.set_nonblocking(true).unwrap();
        use std::io::Write;
        let mut b = b;
        b.write_all(b"x").unwrap();

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(listener.readable.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_listener_before_firing_suppresses_the_event() {
        let reactor = Reactor::start().unwrap();
        let (a, b) = UnixStream::pair().unwrap();
        let listener = Arc::new(RecordingListener {
            readable: AtomicU32::new(0),
            error: AtomicU32::new(0),
        });
        let weak: Weak<dyn ReadinessListener> = Arc::downgrade(&listener) as Weak<dyn ReadinessListener>;
        let token = reactor.add_listener(1, a.as_raw_fd(), weak).unwrap();
        assert!(reactor.remove_listener(token));

        use std::io::Write;
        let mut b = b;
        b.write_all(b"x").unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(listener.readable.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn remove_listener_after_firing_is_a_harmless_no_op() {
        let reactor = Reactor::start().unwrap();
        let (a, b) = UnixStream::pair().unwrap();
        let listener = Arc::new(RecordingListener {
            readable: AtomicU32::new(0),
            error: AtomicU32::new(0),
        });
        let weak: Weak<dyn ReadinessListener> = Arc::downgrade(&listener) as Weak<dyn ReadinessListener>;
        let token = reactor.add_listener(1, a.as_raw_fd(), weak).unwrap();

        use std::io::Write;
        let mut b = b;
        b.write_all(b"x").unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(!reactor.remove_listener(token));
    }

    #[test]
    fn pool_routes_by_fd_deterministically() {
        let pool = ReactorPool::new(3).unwrap();
        let (a, _b) = UnixStream::pair().unwrap();
        let fd = a.as_raw_fd();
        let first = Arc::as_ptr(pool.get(fd));
        let second = Arc::as_ptr(pool.get(fd));
        assert_eq!(first, second);
    }
}
