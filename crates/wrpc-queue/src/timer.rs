//! A delay queue: tasks become eligible to pop only once their
//! [`TaskAttr::exec_time_us`] has passed. `pop_task` sleeps on a condvar for
//! exactly as long as the earliest-due task still needs, so it neither busy-polls
//! nor oversleeps past newly-pushed, earlier-due tasks (a push always re-checks the
//! wait).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use wrpc_objectpool::{ObjectPool, PooledObject};

use crate::task::{TaskAttr, TaskEntry, TaskFn, TaskId, TaskQueue};

struct State {
    heap: BinaryHeap<Reverse<(i64, TaskId)>>,
    live: HashMap<TaskId, PooledObject<TaskEntry>>,
}

pub struct TimerTaskQueue {
    pool: ObjectPool<TaskEntry>,
    state: Mutex<State>,
    cond: Condvar,
    next_id: AtomicI64,
}

impl TimerTaskQueue {
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool: ObjectPool::new(pool_size),
            state: Mutex::new(State {
                heap: BinaryHeap::new(),
                live: HashMap::new(),
            }),
            cond: Condvar::new(),
            next_id: AtomicI64::new(0),
        }
    }

    /// Schedules `func` to become eligible `delay_us` microseconds from now.
    pub fn push_delay_task(&self, delay_us: i64, func: TaskFn) -> TaskId {
        let attr = TaskAttr {
            exec_time_us: wrpc_core::timer::now_micros() + delay_us,
            ..TaskAttr::default()
        };
        self.push_task_with_attr(func, attr)
    }
}

impl Default for TimerTaskQueue {
    fn default() -> Self {
        Self::new(128)
    }
}

impl TaskQueue for TimerTaskQueue {
    fn push_task_with_attr(&self, func: TaskFn, attr: TaskAttr) -> TaskId {
        let entry = self.pool.fetch(|e| {
            e.func = Some(func);
            e.attr = attr;
        });
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().unwrap();
        state.heap.push(Reverse((attr.exec_time_us, id)));
        state.live.insert(id, entry);
        // A newly pushed task may be due sooner than whatever the consumer is
        // currently sleeping until, so always wake it to re-check.
        self.cond.notify_all();
        id
    }

    fn pop_task(&self) -> (TaskFn, TaskAttr) {
        let mut state = self.state.lock().unwrap();
        loop {
            while state.heap.is_empty() {
                state = self.cond.wait(state).unwrap();
            }
            let Reverse((exec_time, id)) = *state.heap.peek().unwrap();
            if !state.live.contains_key(&id) {
                state.heap.pop();
                continue;
            }

            let now = wrpc_core::timer::now_micros();
            if exec_time > now {
                let wait = Duration::from_micros((exec_time - now) as u64);
                let (guard, _timed_out) = self.cond.wait_timeout(state, wait).unwrap();
                state = guard;
                continue;
            }

            state.heap.pop();
            let mut entry = state.live.remove(&id).unwrap();
            let func = entry.func.take().expect("live task entry missing func");
            let attr = entry.attr;
            return (func, attr);
        }
    }

    fn cancel_task(&self, task_id: TaskId) -> bool {
        self.state.lock().unwrap().live.remove(&task_id).is_some()
    }

    fn queue_len(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn task_is_not_eligible_before_its_deadline() {
        let q = Arc::new(TimerTaskQueue::new(8));
        q.push_delay_task(20_000, Box::new(|| {}));
        let start = std::time::Instant::now();
        let (_, _) = q.pop_task();
        assert!(start.elapsed() >= Duration::from_micros(15_000));
    }

    #[test]
    fn earlier_task_pushed_after_wakes_up_the_waiting_consumer() {
        let q = Arc::new(TimerTaskQueue::new(8));
        q.push_delay_task(200_000, Box::new(|| {}));
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let start = std::time::Instant::now();
                q.pop_task();
                start.elapsed()
            })
        };
        thread::sleep(Duration::from_millis(20));
        q.push_delay_task(0, Box::new(|| {}));
        let elapsed = consumer.join().unwrap();
        assert!(elapsed < Duration::from_millis(150));
    }

    #[test]
    fn canceled_timer_task_is_skipped() {
        let q = TimerTaskQueue::new(8);
        let id = q.push_delay_task(0, Box::new(|| {}));
        q.push_delay_task(0, Box::new(|| {}));
        assert!(q.cancel_task(id));
        assert_eq!(q.queue_len(), 1);
        q.pop_task();
    }
}
