use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use wrpc_queue::TaskQueue;

/// Scheduling-delay and execution-cost stats accumulated by a [`WorkerPool`]
/// since construction or the last `profile(true)` reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolProfile {
    pub completed: u64,
    pub avg_schedule_delay_us: i64,
    pub avg_execution_us: i64,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    schedule_delay_total_us: AtomicI64,
    execution_total_us: AtomicI64,
}

impl Counters {
    fn record(&self, schedule_delay_us: i64, execution_us: i64) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.schedule_delay_total_us
            .fetch_add(schedule_delay_us, Ordering::Relaxed);
        self.execution_total_us
            .fetch_add(execution_us, Ordering::Relaxed);
    }

    fn snapshot(&self, clear: bool) -> PoolProfile {
        let completed = if clear {
            self.completed.swap(0, Ordering::Relaxed)
        } else {
            self.completed.load(Ordering::Relaxed)
        };
        let schedule_total = if clear {
            self.schedule_delay_total_us.swap(0, Ordering::Relaxed)
        } else {
            self.schedule_delay_total_us.load(Ordering::Relaxed)
        };
        let exec_total = if clear {
            self.execution_total_us.swap(0, Ordering::Relaxed)
        } else {
            self.execution_total_us.load(Ordering::Relaxed)
        };
        if completed == 0 {
            return PoolProfile::default();
        }
        PoolProfile {
            completed,
            avg_schedule_delay_us: schedule_total / completed as i64,
            avg_execution_us: exec_total / completed as i64,
        }
    }
}

/// A fixed number of threads draining one shared [`TaskQueue`]. Every task is
/// run inside `std::panic::catch_unwind`: a panicking task is still counted
/// as completed and does not bring the worker thread down, matching
/// `EventListeners::emit`'s panic-catching precedent elsewhere in this
/// workspace.
pub struct WorkerPool {
    queue: Arc<dyn TaskQueue>,
    counters: Arc<Counters>,
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `thread_num` worker threads draining `queue`.
    pub fn start(thread_num: usize, queue: Arc<dyn TaskQueue>) -> Self {
        let thread_num = thread_num.max(1);
        let counters = Arc::new(Counters::default());
        let stop = Arc::new(AtomicBool::new(false));
        let mut threads = Vec::with_capacity(thread_num);

        for index in 0..thread_num {
            let queue = Arc::clone(&queue);
            let counters = Arc::clone(&counters);
            let stop = Arc::clone(&stop);
            let handle = std::thread::Builder::new()
                .name(format!("wrpc-worker-{index}"))
                .spawn(move || worker_loop(queue, counters, stop))
                .expect("failed to spawn wrpc worker thread");
            threads.push(handle);
        }

        Self {
            queue,
            counters,
            stop,
            threads,
        }
    }

    /// Signals every worker thread to stop and, if `wait`, joins them all.
    /// Pushes one no-op task per thread to unblock a thread that is currently
    /// parked waiting for work.
    pub fn stop(mut self, wait: bool) {
        self.stop.store(true, Ordering::Release);
        for _ in 0..self.threads.len() {
            self.queue.push_task(Box::new(|| {}));
        }
        if wait {
            for handle in self.threads.drain(..) {
                let _ = handle.join();
            }
        }
    }

    pub fn profile(&self, clear: bool) -> PoolProfile {
        self.counters.snapshot(clear)
    }

    pub fn thread_num(&self) -> usize {
        self.threads.len()
    }
}

fn worker_loop(queue: Arc<dyn TaskQueue>, counters: Arc<Counters>, stop: Arc<AtomicBool>) {
    loop {
        if stop.load(Ordering::Acquire) {
            return;
        }
        let (task, attr) = queue.pop_task();
        if stop.load(Ordering::Acquire) {
            return;
        }

        let popped_at = wrpc_core::timer::now_micros();
        let schedule_delay = (popped_at - attr.exec_time_us).max(0);

        let start = wrpc_core::timer::now_micros();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
        let execution_us = wrpc_core::timer::now_micros() - start;

        if let Err(_panic_payload) = result {
            #[cfg(feature = "tracing")]
            tracing::warn!("wrpc worker task panicked; task counted as completed");
            #[cfg(feature = "metrics")]
            metrics::counter!("wrpc_worker_task_panics_total").increment(1);
        }

        counters.record(schedule_delay, execution_us);
        #[cfg(feature = "metrics")]
        metrics::histogram!("wrpc_worker_execution_us").record(execution_us as f64);
    }
}
