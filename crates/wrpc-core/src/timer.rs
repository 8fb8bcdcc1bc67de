//! Monotonic timing primitives: a sampled clock, an elapsed timer, and a countdown
//! timer with the "negative timeout means unbounded" convention used everywhere a
//! deadline is threaded through the runtime.

use std::time::Instant;

/// A duration measured in whole microseconds, the primary unit for costs and
/// deadlines throughout this runtime.
pub type Microseconds = i64;

/// Samples the process-wide monotonic clock (not wall-clock time) in microseconds.
/// Used for elapsed-time measurement; never exposed for display purposes.
pub fn now_micros() -> Microseconds {
    CLOCK_START.elapsed().as_micros() as Microseconds
}

pub fn now_millis() -> Microseconds {
    now_micros() / 1_000
}

pub fn now_seconds() -> Microseconds {
    now_micros() / 1_000_000
}

static CLOCK_START: std::sync::LazyLock<Instant> = std::sync::LazyLock::new(Instant::now);

/// Measures elapsed time since construction or the last [`reset`](Self::reset).
pub struct ElapsedTimer {
    start: Microseconds,
}

impl ElapsedTimer {
    pub fn new() -> Self {
        Self {
            start: now_micros(),
        }
    }

    pub fn start_time(&self) -> Microseconds {
        self.start
    }

    /// Microseconds elapsed since start (or the last reset).
    pub fn tick(&self) -> Microseconds {
        now_micros() - self.start
    }

    pub fn reset(&mut self) {
        self.start = now_micros();
    }
}

impl Default for ElapsedTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// A deadline timer. A negative `timeout` means "no timeout": [`remain`] always
/// reports `-1` and [`timeout`] always reports `false`, matching every network
/// operation's "negative means unbounded" convention.
///
/// [`remain`]: Self::remain
/// [`timeout`]: Self::timeout
pub struct CountdownTimer {
    timeout: Microseconds,
    start: Microseconds,
    target: Microseconds,
}

impl CountdownTimer {
    pub fn new(timeout: Microseconds) -> Self {
        let start = now_micros();
        Self {
            timeout,
            start,
            target: start.saturating_add(timeout),
        }
    }

    pub fn start_time(&self) -> Microseconds {
        self.start
    }

    pub fn target_time(&self) -> Microseconds {
        self.target
    }

    pub fn tick(&self) -> Microseconds {
        now_micros() - self.start
    }

    /// Remaining microseconds before the deadline, or `-1` if unbounded.
    pub fn remain(&self) -> Microseconds {
        if self.timeout < 0 {
            -1
        } else {
            self.target - now_micros()
        }
    }

    /// Returns whether the deadline has passed, and optionally the remaining time.
    pub fn is_expired(&self) -> bool {
        if self.timeout < 0 {
            false
        } else {
            self.remain() <= 0
        }
    }

    pub fn reset(&mut self, timeout: Microseconds) {
        self.timeout = timeout;
        self.start = now_micros();
        self.target = self.start.saturating_add(timeout);
    }
}
