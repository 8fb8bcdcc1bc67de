//! A priority queue: the task with the lowest [`TaskAttr::priority`] value runs
//! next, with FIFO order as a tiebreak among equal priorities via insertion order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Condvar, Mutex};

use wrpc_objectpool::{ObjectPool, PooledObject};

use crate::task::{TaskAttr, TaskEntry, TaskFn, TaskId, TaskQueue};

struct State {
    heap: BinaryHeap<Reverse<(u64, TaskId)>>,
    live: HashMap<TaskId, PooledObject<TaskEntry>>,
}

pub struct PriorityTaskQueue {
    pool: ObjectPool<TaskEntry>,
    state: Mutex<State>,
    cond: Condvar,
    next_id: AtomicI64,
}

impl PriorityTaskQueue {
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
}

impl Default for PriorityTaskQueue {
    fn default() -> Self {
        Self::new(128)
    }
}

impl TaskQueue for PriorityTaskQueue {
    fn push_task_with_attr(&self, func: TaskFn, attr: TaskAttr) -> TaskId {
        let entry = self.pool.fetch(|e| {
            e.func = Some(func);
            e.attr = attr;
        });
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().unwrap();
        state.heap.push(Reverse((attr.priority, id)));
        state.live.insert(id, entry);
        self.cond.notify_one();
        id
    }

    fn pop_task(&self) -> (TaskFn, TaskAttr) {
        let mut state = self.state.lock().unwrap();
        loop {
            while state.heap.is_empty() {
                state = self.cond.wait(state).unwrap();
            }
            let Reverse((_, id)) = state.heap.pop().unwrap();
            if let Some(mut entry) = state.live.remove(&id) {
                let func = entry.func.take().expect("live task entry missing func");
                let attr = entry.attr;
                return (func, attr);
            }
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

    #[test]
    fn lower_priority_value_runs_first() {
        let q = PriorityTaskQueue::new(8);
        q.push_task_with_attr(
            Box::new(|| {}),
            TaskAttr {
                priority: 5,
                ..TaskAttr::default()
            },
        );
        q.push_task_with_attr(
            Box::new(|| {}),
            TaskAttr {
                priority: 1,
                ..TaskAttr::default()
            },
        );
        let (_, attr) = q.pop_task();
        assert_eq!(attr.priority, 1);
        let (_, attr) = q.pop_task();
        assert_eq!(attr.priority, 5);
    }

    #[test]
    fn canceled_task_is_skipped_when_its_turn_comes() {
        let q = PriorityTaskQueue::new(8);
        let id = q.push_task_with_attr(
            Box::new(|| {}),
            TaskAttr {
                priority: 0,
                ..TaskAttr::default()
            },
        );
        q.push_task_with_attr(
            Box::new(|| {}),
            TaskAttr {
                priority: 1,
                ..TaskAttr::default()
            },
        );
        assert!(q.cancel_task(id));
        let (_, attr) = q.pop_task();
        assert_eq!(attr.priority, 1);
    }
}
