//! A fixed-capacity blocking ring: each index is a single slot, guarded by its own
//! mutex/condvar pair so producers and consumers waiting on different indices never
//! contend with each other. Capacity is rounded up to the next power of two so the
//! index-to-slot mapping is a mask instead of a modulo.
//!
//! `push`/`pop` never drop a value: a push spins (with a short sleep) until the
//! slot it was handed is empty, and a pop blocks on that slot's condvar until the
//! slot is filled. There is no bound on how long either can block; callers that
//! need a deadline wrap this with their own timeout.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::Duration;

const SPIN_SLEEP: Duration = Duration::from_micros(50);

fn next_pow_of_two(value: u32) -> u32 {
    if value <= 1 {
        1
    } else {
        1u32 << (32 - (value - 1).leading_zeros())
    }
}

pub struct RingQueue<T> {
    capacity: u32,
    mask: u32,
    slots: Box<[AtomicPtr<T>]>,
    waiters: Box<[(Mutex<()>, Condvar)]>,
    head: AtomicU32,
    tail: AtomicU32,
    len: AtomicU32,
}

unsafe impl<T: Send> Send for RingQueue<T> {}
unsafe impl<T: Send> Sync for RingQueue<T> {}

impl<T> RingQueue<T> {
    pub fn new(capacity: u32) -> Self {
        let capacity = next_pow_of_two(capacity);
        let slots = (0..capacity)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();
        let waiters = (0..capacity)
            .map(|_| (Mutex::new(()), Condvar::new()))
            .collect();
        Self {
            capacity,
            mask: capacity - 1,
            slots,
            waiters,
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
            len: AtomicU32::new(0),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn len(&self) -> u32 {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claims the next slot and waits until it is empty before filling it. Returns
    /// the slot index the value was stored at.
    pub fn push(&self, value: T) -> u32 {
        let index = self.head.fetch_add(1, Ordering::Relaxed);
        let real = (index & self.mask) as usize;
        let raw = Box::into_raw(Box::new(value));

        let mut expected = ptr::null_mut();
        while self.slots[real]
            .compare_exchange_weak(expected, raw, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            thread::sleep(SPIN_SLEEP);
            expected = ptr::null_mut();
        }

        let (lock, cvar) = &self.waiters[real];
        let _guard = lock.lock().unwrap();
        self.len.fetch_add(1, Ordering::AcqRel);
        cvar.notify_one();
        index
    }

    /// Claims the next slot to drain and blocks until a value is available there.
    pub fn pop(&self) -> T {
        let index = self.tail.fetch_add(1, Ordering::Relaxed);
        let real = (index & self.mask) as usize;
        let (lock, cvar) = &self.waiters[real];

        let mut guard = lock.lock().unwrap();
        let mut raw = self.slots[real].swap(ptr::null_mut(), Ordering::AcqRel);
        while raw.is_null() {
            guard = cvar.wait(guard).unwrap();
            raw = self.slots[real].swap(ptr::null_mut(), Ordering::AcqRel);
        }
        self.len.fetch_sub(1, Ordering::AcqRel);
        unsafe { *Box::from_raw(raw) }
    }
}

impl<T> Drop for RingQueue<T> {
    fn drop(&mut self) {
        for slot in self.slots.iter() {
            let raw = slot.swap(ptr::null_mut(), Ordering::AcqRel);
            if !raw.is_null() {
                unsafe {
                    drop(Box::from_raw(raw));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn capacity_rounds_up_to_power_of_two() {
        assert_eq!(RingQueue::<u32>::new(5).capacity(), 8);
        assert_eq!(RingQueue::<u32>::new(8).capacity(), 8);
        assert_eq!(RingQueue::<u32>::new(0).capacity(), 1);
    }

    #[test]
    fn push_then_pop_round_trips_in_fifo_order() {
        let q: RingQueue<u32> = RingQueue::new(4);
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), 1);
        assert_eq!(q.pop(), 2);
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop(), 3);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn pop_blocks_until_a_value_is_pushed() {
        let q = Arc::new(RingQueue::<u32>::new(4));
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.pop())
        };
        thread::sleep(Duration::from_millis(20));
        q.push(42);
        assert_eq!(consumer.join().unwrap(), 42);
    }

    #[test]
    fn wraps_around_the_ring_under_sustained_traffic() {
        let q: RingQueue<u32> = RingQueue::new(2);
        for round in 0..10u32 {
            q.push(round);
            assert_eq!(q.pop(), round);
        }
    }
}
