//! A hot-reloadable resource holder backed by two slots indexed by a single-bit
//! version. Reads never take a lock: a reader bumps the refcount on whatever
//! version is current, then re-checks the version in case a reload raced it,
//! rebinding if so. A reload takes the reload lock, builds the new resource via
//! the configured loader, publishes it into the inactive slot, flips the version,
//! then opportunistically drops the old slot if nothing still references it.
//!
//! The old slot may outlive the reload call that retired it — it is only ever
//! freed once its refcount reaches zero, whether that happens during the reload
//! itself or later, as each outstanding [`ResourceHandle`] is dropped.

use std::cell::UnsafeCell;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReloadError {
    #[error("resource loader returned no resource")]
    LoadFailed,
    #[error("the inactive buffer still has outstanding readers")]
    BufferInUse,
}

type Loader<R> = Box<dyn Fn() -> Option<R> + Send + Sync>;

struct Inner<R> {
    reload_mutex: Mutex<()>,
    loader: Loader<R>,
    version: AtomicU8,
    refs: [AtomicU32; 2],
    slots: [UnsafeCell<Option<Box<R>>>; 2],
}

unsafe impl<R: Send + Sync> Sync for Inner<R> {}

impl<R> Inner<R> {
    fn ref_version(&self, version: u8) {
        self.refs[(version & 1) as usize].fetch_add(1, Ordering::AcqRel);
    }

    fn unref_version(&self, version: u8) {
        self.refs[(version & 1) as usize].fetch_sub(1, Ordering::AcqRel);
        let _ = self.release_unused();
    }

    fn load_resource(&self, reload_mutex: &Mutex<()>, is_reload: bool) -> Result<(), ReloadError> {
        let _guard = reload_mutex.lock().unwrap();
        let cur_version = self.version.load(Ordering::Acquire);
        let index_to_load = if is_reload {
            cur_version.wrapping_add(1) & 1
        } else {
            cur_version & 1
        };

        if self.refs[index_to_load as usize].load(Ordering::Acquire) != 0 {
            return Err(ReloadError::BufferInUse);
        }

        let resource = (self.loader)().ok_or(ReloadError::LoadFailed)?;
        unsafe {
            *self.slots[index_to_load as usize].get() = Some(Box::new(resource));
        }
        self.version.store(index_to_load, Ordering::Release);

        if is_reload {
            let _ = self.try_release_version_locked((index_to_load + 1) & 1);
        }
        Ok(())
    }

    fn try_release_version_locked(&self, version_to_release: u8) -> Result<(), ReloadError> {
        if version_to_release == self.version.load(Ordering::Acquire) {
            return Err(ReloadError::BufferInUse);
        }
        if self.refs[version_to_release as usize].load(Ordering::Acquire) != 0 {
            return Err(ReloadError::BufferInUse);
        }
        unsafe {
            let slot = &mut *self.slots[version_to_release as usize].get();
            if slot.is_none() {
                return Err(ReloadError::BufferInUse);
            }
            *slot = None;
        }
        Ok(())
    }

    fn release_unused(&self) -> Result<(), ReloadError> {
        let version_to_release = self.version.load(Ordering::Acquire).wrapping_add(1) & 1;
        if self.refs[version_to_release as usize].load(Ordering::Acquire) != 0 {
            return Err(ReloadError::BufferInUse);
        }
        let _guard = self.reload_mutex.lock().unwrap();
        self.try_release_version_locked(version_to_release)
    }
}

/// A hot-reloadable holder of `R`, constructed via a loader closure that
/// captures whatever context it needs to produce a fresh `R`.
pub struct Reloadable<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for Reloadable<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Send + Sync> Reloadable<R> {
    pub fn new(loader: impl Fn() -> Option<R> + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                reload_mutex: Mutex::new(()),
                loader: Box::new(loader),
                version: AtomicU8::new(0),
                refs: [AtomicU32::new(0), AtomicU32::new(0)],
                slots: [UnsafeCell::new(None), UnsafeCell::new(None)],
            }),
        }
    }

    /// Loads the first version of the resource. Fails with
    /// [`ReloadError::BufferInUse`] only if called concurrently with itself.
    pub fn init(&self) -> Result<(), ReloadError> {
        self.inner.load_resource(&self.inner.reload_mutex, false)
    }

    /// Loads a new version into the inactive slot and swings the active version
    /// over to it. Fails with [`ReloadError::BufferInUse`] if the inactive slot
    /// still has outstanding readers from a prior version.
    pub fn reload(&self) -> Result<(), ReloadError> {
        self.inner.load_resource(&self.inner.reload_mutex, true)
    }

    /// Opportunistically frees the inactive slot if it has no outstanding
    /// readers. Reloads already attempt this; this is for callers that want to
    /// force the check (e.g. after handles they know about have dropped).
    pub fn release_unused(&self) -> Result<(), ReloadError> {
        self.inner.release_unused()
    }

    /// Takes a cheap, refcounted handle to whatever version is currently active.
    pub fn get_resource(&self) -> ResourceHandle<R> {
        let mut version = self.inner.version.load(Ordering::Acquire);
        self.inner.ref_version(version);
        loop {
            let current = self.inner.version.load(Ordering::Acquire);
            if current == version {
                break;
            }
            self.inner.ref_version(current);
            self.inner.unref_version(version);
            version = current;
        }
        ResourceHandle {
            inner: Arc::clone(&self.inner),
            version,
        }
    }
}

/// A refcounted reference into one version of a [`Reloadable`]'s resource. Not
/// `Send`: move the `Reloadable` across threads and call `get_resource` again
/// rather than shipping a handle.
pub struct ResourceHandle<R> {
    inner: Arc<Inner<R>>,
    version: u8,
}

impl<R> Deref for ResourceHandle<R> {
    type Target = R;

    fn deref(&self) -> &R {
        unsafe {
            (*self.inner.slots[(self.version & 1) as usize].get())
                .as_deref()
                .expect("a version referenced by a live handle is never cleared")
        }
    }
}

impl<R> Clone for ResourceHandle<R> {
    fn clone(&self) -> Self {
        self.inner.ref_version(self.version);
        Self {
            inner: Arc::clone(&self.inner),
            version: self.version,
        }
    }
}

impl<R> Drop for ResourceHandle<R> {
    fn drop(&mut self) {
        self.inner.unref_version(self.version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32 as StdAtomicU32;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn init_then_read_sees_the_loaded_value() {
        let r = Reloadable::new(|| Some(42u32));
        r.init().unwrap();
        let h = r.get_resource();
        assert_eq!(*h, 42);
    }

    #[test]
    fn reload_publishes_a_new_value_once_old_handles_drop() {
        let counter = Arc::new(StdAtomicU32::new(0));
        let counter2 = Arc::clone(&counter);
        let r = Reloadable::new(move || Some(counter2.fetch_add(1, Ordering::SeqCst)));
        r.init().unwrap();
        assert_eq!(*r.get_resource(), 0);
        r.reload().unwrap();
        assert_eq!(*r.get_resource(), 1);
    }

    #[test]
    fn reload_fails_while_the_now_inactive_slot_still_has_a_reader() {
        let r = Reloadable::new(|| Some(0u32));
        r.init().unwrap();
        let held = r.get_resource(); // holds version 0
        r.reload().unwrap(); // loads into slot 1, version -> 1; slot 0 not freed (held)
        assert_eq!(r.reload(), Err(ReloadError::BufferInUse)); // slot 0 still held
        drop(held);
        assert!(r.reload().is_ok());
    }

    #[test]
    fn a_reader_holding_a_stale_version_keeps_seeing_its_own_value_across_a_reload() {
        let counter = Arc::new(StdAtomicU32::new(0));
        let counter2 = Arc::clone(&counter);
        let r = Reloadable::new(move || Some(counter2.fetch_add(1, Ordering::SeqCst)));
        r.init().unwrap();
        let old = r.get_resource();
        r.reload().unwrap();
        assert_eq!(*old, 0);
        assert_eq!(*r.get_resource(), 1);
    }

    #[test]
    fn init_surfaces_load_failure() {
        let r: Reloadable<u32> = Reloadable::new(|| None);
        assert_eq!(r.init(), Err(ReloadError::LoadFailed));
    }

    #[test]
    fn concurrent_readers_and_reloader_never_observe_a_dangling_resource() {
        let counter = Arc::new(StdAtomicU32::new(0));
        let counter2 = Arc::clone(&counter);
        let r = Reloadable::new(move || Some(counter2.fetch_add(1, Ordering::SeqCst)));
        r.init().unwrap();

        let readers = 4;
        let barrier = Arc::new(Barrier::new(readers + 1));
        let handles: Vec<_> = (0..readers)
            .map(|_| {
                let r = r.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..2000 {
                        let h = r.get_resource();
                        let _ = *h;
                    }
                })
            })
            .collect();

        barrier.wait();
        for _ in 0..50 {
            let _ = r.reload();
        }

        for h in handles {
            h.join().unwrap();
        }
    }
}
