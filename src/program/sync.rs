/*
 * Cooperative Synchronization Helpers
 *
 * Locks for checked programs. These are not OS locks: acquisition is a
 * guarded compare-and-swap over a checked cell, so blocked acquirers simply
 * stop being runnable until the lock could be theirs, and lock ordering is
 * part of the interleaving search like any other conflict.
 */

use core::cell::{Cell, RefCell};

use crate::config::MAX_THREADS;
use crate::program::mem::Atomic;
use crate::program::{require_result, thread_id};

/// Slots for every logical thread plus the original thread.
const THREAD_SLOTS: usize = MAX_THREADS + 1;

/// Cooperative mutual exclusion over an atomic boolean.
#[derive(Copy, Clone)]
pub struct Mutex {
    held: Atomic<bool>,
}

impl Mutex {
    pub fn leaked() -> Mutex {
        Mutex {
            held: Atomic::leaked(false),
        }
    }

    /// Re-initialize between trials.
    pub fn reset(&self) {
        self.held.store(false);
    }

    /// Block (cooperatively) until the lock is taken.
    pub fn acquire(&self) {
        // The guard admits the CAS only when it would succeed, so the loop
        // body runs exactly once.
        require_result(false as i64);
        while !self.held.cas(false, true) {}
    }

    pub fn try_acquire(&self) -> bool {
        self.held.cas(false, true)
    }

    pub fn release(&self) {
        self.held.store(false);
    }
}

/// Mutex that the holding thread may re-acquire.
pub struct RecursiveMutex {
    held: Atomic<bool>,
    count: [Cell<i64>; THREAD_SLOTS],
}

impl RecursiveMutex {
    pub fn leaked() -> &'static RecursiveMutex {
        Box::leak(Box::new(RecursiveMutex {
            held: Atomic::leaked(false),
            count: core::array::from_fn(|_| Cell::new(0)),
        }))
    }

    pub fn reset(&self) {
        self.held.store(false);
        for count in self.count.iter() {
            count.set(0);
        }
    }

    pub fn acquire(&self) {
        let count = &self.count[thread_id().slot()];
        count.set(count.get() + 1);
        if count.get() > 1 {
            return;
        }

        require_result(false as i64);
        while !self.held.cas(false, true) {}
    }

    pub fn try_acquire(&self) -> bool {
        let count = &self.count[thread_id().slot()];
        if count.get() > 0 || self.held.cas(false, true) {
            count.set(count.get() + 1);
            true
        } else {
            false
        }
    }

    pub fn release(&self) {
        let count = &self.count[thread_id().slot()];
        count.set(count.get() - 1);
        if count.get() > 0 {
            return;
        }

        self.held.store(false);
    }
}

/// Per-thread storage keyed by the current logical thread id. A fixed
/// array, not OS TLS: the original thread gets the last slot.
pub struct ThreadLocalStorage<T> {
    slots: [RefCell<T>; THREAD_SLOTS],
}

impl<T: Default> ThreadLocalStorage<T> {
    pub fn leaked() -> &'static ThreadLocalStorage<T> {
        Box::leak(Box::new(ThreadLocalStorage {
            slots: core::array::from_fn(|_| RefCell::new(T::default())),
        }))
    }

    /// Access the calling thread's slot.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.slots[thread_id().slot()].borrow_mut())
    }

    /// Re-initialize every slot between trials.
    pub fn reset(&self) {
        for slot in self.slots.iter() {
            *slot.borrow_mut() = T::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Outside a checking session the lock cells execute transparently, so
    // the bookkeeping can be exercised directly.

    #[test]
    fn mutex_try_acquire_reflects_state() {
        let lock = Mutex::leaked();
        assert!(lock.try_acquire());
        assert!(!lock.try_acquire());
        lock.release();
        assert!(lock.try_acquire());
    }

    #[test]
    fn recursive_mutex_counts_reentry() {
        let lock = RecursiveMutex::leaked();
        assert!(lock.try_acquire());
        assert!(lock.try_acquire());
        lock.release();
        // One release of two: the owner can still re-enter.
        assert!(lock.try_acquire());
        lock.release();
        lock.release();
        assert!(lock.try_acquire());
        lock.reset();
    }

    #[test]
    fn thread_local_storage_resets() {
        let tls: &ThreadLocalStorage<i64> = ThreadLocalStorage::leaked();
        tls.with(|v| *v = 41);
        assert_eq!(tls.with(|v| *v), 41);
        tls.reset();
        assert_eq!(tls.with(|v| *v), 0);
    }
}
