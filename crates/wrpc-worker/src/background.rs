use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use wrpc_queue::{TaskFn, TaskId, TaskQueue, TimerTaskQueue, INVALID_TASK_ID};

use crate::pool::WorkerPool;

/// The process-wide timer-task queue plus worker pool that drives every
/// periodic or deferred job in the runtime: endpoint refresh, health checks,
/// backup-request firing, total-timeout firing, and feedback delivery. A
/// `Channel`/`Session` holds an `Arc<BackgroundRuntime>` rather than reaching
/// for bare free functions, favoring an explicit runtime handle over a hidden
/// global — while still offering [`BackgroundRuntime::global`] as a
/// lazily-initialized convenience singleton for callers who want ambient
/// behavior.
pub struct BackgroundRuntime {
    queue: Arc<TimerTaskQueue>,
    pool: Mutex<Option<WorkerPool>>,
}

impl BackgroundRuntime {
    /// Starts `worker_threads` workers draining a fresh timer queue.
    pub fn start(worker_threads: usize) -> Arc<Self> {
        let queue = Arc::new(TimerTaskQueue::new(1024));
        let pool = WorkerPool::start(worker_threads, Arc::clone(&queue) as Arc<dyn TaskQueue>);
        Arc::new(Self {
            queue,
            pool: Mutex::new(Some(pool)),
        })
    }

    /// The process-wide default instance: one worker thread, matching this
    /// crate's documented default (§6 "defaults: 1 reactor thread, 1
    /// background worker thread").
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<BackgroundRuntime>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| BackgroundRuntime::start(1)))
    }

    /// Runs `func` as soon as a worker thread is free.
    pub fn spawn(&self, func: TaskFn) -> TaskId {
        self.queue.push_delay_task(0, func)
    }

    /// Runs `func` no sooner than `delay_us` microseconds from now.
    pub fn schedule_delay(&self, delay_us: i64, func: TaskFn) -> TaskId {
        self.queue.push_delay_task(delay_us, func)
    }

    /// Best-effort cancellation; see [`wrpc_queue::TaskQueue::cancel_task`].
    pub fn cancel(&self, id: TaskId) -> bool {
        if id == INVALID_TASK_ID {
            return false;
        }
        self.queue.cancel_task(id)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.queue_len()
    }

    /// Stops accepting new dispatch and joins the worker threads. Idempotent.
    pub fn shutdown(&self, wait: bool) {
        if let Some(pool) = self.pool.lock().unwrap().take() {
            pool.stop(wait);
        }
    }
}

/// A periodic job that reschedules itself after every run until stopped.
/// Used by `wrpc-channel` for `refresh_endpoints`/`health_check`.
pub struct PeriodicTask {
    stopped: Arc<AtomicBool>,
    current_id: Arc<Mutex<TaskId>>,
    runtime: Arc<BackgroundRuntime>,
}

impl PeriodicTask {
    /// Starts running `func` every `period_us`, starting `period_us` from now.
    pub fn start(
        runtime: Arc<BackgroundRuntime>,
        period_us: i64,
        func: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        let stopped = Arc::new(AtomicBool::new(false));
        let current_id = Arc::new(Mutex::new(INVALID_TASK_ID));
        let task = Self {
            stopped: Arc::clone(&stopped),
            current_id: Arc::clone(&current_id),
            runtime: Arc::clone(&runtime),
        };
        schedule_next(runtime, period_us, Arc::new(func), stopped, current_id);
        task
    }

    /// Stops future reschedules and cancels the currently pending run, if any.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let id = *self.current_id.lock().unwrap();
        self.runtime.cancel(id);
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

fn schedule_next(
    runtime: Arc<BackgroundRuntime>,
    period_us: i64,
    func: Arc<dyn Fn() + Send + Sync>,
    stopped: Arc<AtomicBool>,
    current_id: Arc<Mutex<TaskId>>,
) {
    if stopped.load(Ordering::Acquire) {
        return;
    }
    let runtime_for_closure = Arc::clone(&runtime);
    let func_for_closure = Arc::clone(&func);
    let stopped_for_closure = Arc::clone(&stopped);
    let current_id_for_closure = Arc::clone(&current_id);
    let id = runtime.schedule_delay(
        period_us,
        Box::new(move || {
            (func_for_closure)();
            schedule_next(
                runtime_for_closure,
                period_us,
                func_for_closure,
                stopped_for_closure,
                current_id_for_closure,
            );
        }),
    );
    *current_id.lock().unwrap() = id;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn spawn_runs_once() {
        let rt = BackgroundRuntime::start(2);
        let counter = Arc::new(AtomicU32::new(0));
        let counter2 = Arc::clone(&counter);
        rt.spawn(Box::new(move || {
            counter2.fetch_add(1, Ordering::SeqCst);
        }));
        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        while counter.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        rt.shutdown(true);
    }

    #[test]
    fn scheduled_task_does_not_run_before_its_delay() {
        let rt = BackgroundRuntime::start(1);
        let counter = Arc::new(AtomicU32::new(0));
        let counter2 = Arc::clone(&counter);
        rt.schedule_delay(
            50_000,
            Box::new(move || {
                counter2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        rt.shutdown(true);
    }

    #[test]
    fn cancel_before_it_fires_suppresses_the_run() {
        let rt = BackgroundRuntime::start(1);
        let counter = Arc::new(AtomicU32::new(0));
        let counter2 = Arc::clone(&counter);
        let id = rt.schedule_delay(
            50_000,
            Box::new(move || {
                counter2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(rt.cancel(id));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        rt.shutdown(true);
    }

    #[test]
    fn periodic_task_runs_more_than_once_then_stops() {
        let rt = BackgroundRuntime::start(1);
        let counter = Arc::new(AtomicU32::new(0));
        let counter2 = Arc::clone(&counter);
        let periodic = PeriodicTask::start(Arc::clone(&rt), 20_000, move || {
            counter2.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(90));
        periodic.stop();
        let seen_after_stop = counter.load(Ordering::SeqCst);
        assert!(seen_after_stop >= 2, "expected several runs, saw {seen_after_stop}");
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(counter.load(Ordering::SeqCst), seen_after_stop);
        rt.shutdown(true);
    }

    #[test]
    fn global_returns_the_same_instance() {
        let a = BackgroundRuntime::global();
        let b = BackgroundRuntime::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
