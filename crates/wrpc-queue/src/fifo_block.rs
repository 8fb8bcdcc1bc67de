//! A bounded FIFO queue built directly on [`RingQueue`]: pushing beyond capacity
//! blocks (via the ring's own slot-wait) instead of growing, which is the variant
//! to reach for when a producer that outruns its consumers should be throttled
//! rather than buffered without bound.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crate::ring::RingQueue;
use crate::task::{do_nothing, TaskAttr, TaskFn, TaskId, TaskQueue};

type CancelSlot = Arc<Mutex<Option<TaskFn>>>;

struct Entry {
    id: TaskId,
    slot: CancelSlot,
    attr: TaskAttr,
}

pub struct FifoBlockQueue {
    ring: RingQueue<Entry>,
    cancelable: Mutex<HashMap<TaskId, CancelSlot>>,
    next_id: AtomicI64,
}

impl FifoBlockQueue {
    pub fn new(capacity: u32) -> Self {
        Self {
            ring: RingQueue::new(capacity),
            cancelable: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(0),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.ring.capacity()
    }
}

impl TaskQueue for FifoBlockQueue {
    fn push_task_with_attr(&self, func: TaskFn, attr: TaskAttr) -> TaskId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(Mutex::new(Some(func)));
        self.cancelable.lock().unwrap().insert(id, Arc::clone(&slot));
        self.ring.push(Entry { id, slot, attr });
        id
    }

    fn pop_task(&self) -> (TaskFn, TaskAttr) {
        loop {
            let entry = self.ring.pop();
            self.cancelable.lock().unwrap().remove(&entry.id);
            let taken = entry.slot.lock().unwrap().take();
            match taken {
                Some(func) => return (func, entry.attr),
                None => continue,
            }
        }
    }

    fn cancel_task(&self, task_id: TaskId) -> bool {
        match self.cancelable.lock().unwrap().remove(&task_id) {
            Some(slot) => {
                let mut guard = slot.lock().unwrap();
                let was_pending = guard.is_some();
                *guard = Some(Box::new(do_nothing));
                was_pending
            }
            None => false,
        }
    }

    fn queue_len(&self) -> usize {
        self.ring.len() as usize
    }
}
