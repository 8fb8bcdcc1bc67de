//! An unbounded FIFO queue. Unlike [`crate::FifoBlockQueue`] a push never blocks;
//! memory is the only limit. Entries are pooled so steady-state push/pop traffic
//! does not allocate on every call.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Condvar, Mutex};

use wrpc_objectpool::{ObjectPool, PooledObject};

use crate::task::{TaskAttr, TaskEntry, TaskFn, TaskId, TaskQueue};

struct State {
    queue: VecDeque<(TaskId, PooledObject<TaskEntry>)>,
    live: HashSet<TaskId>,
}

pub struct FifoTaskQueue {
    pool: ObjectPool<TaskEntry>,
    state: Mutex<State>,
    cond: Condvar,
    next_id: AtomicI64,
}

impl FifoTaskQueue {
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool: ObjectPool::new(pool_size),
            state: Mutex::new(State {
                queue: VecDeque::new(),
                live: HashSet::new(),
            }),
            cond: Condvar::new(),
            next_id: AtomicI64::new(0),
        }
    }
}

impl Default for FifoTaskQueue {
    fn default() -> Self {
        Self::new(128)
    }
}

impl TaskQueue for FifoTaskQueue {
    fn push_task_with_attr(&self, func: TaskFn, attr: TaskAttr) -> TaskId {
        let entry = self.pool.fetch(|e| {
            e.func = Some(func);
            e.attr = attr;
        });
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().unwrap();
        state.live.insert(id);
        state.queue.push_back((id, entry));
        self.cond.notify_one();
        id
    }

    fn pop_task(&self) -> (TaskFn, TaskAttr) {
        let mut state = self.state.lock().unwrap();
        loop {
            while state.queue.is_empty() {
                state = self.cond.wait(state).unwrap();
            }
            let (id, mut entry) = state.queue.pop_front().unwrap();
            if state.live.remove(&id) {
                let func = entry.func.take().expect("live task entry missing func");
                let attr = entry.attr;
                return (func, attr);
            }
            // Already canceled before being popped; drop and keep looking.
        }
    }

    fn cancel_task(&self, task_id: TaskId) -> bool {
        self.state.lock().unwrap().live.remove(&task_id)
    }

    fn queue_len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }
}
