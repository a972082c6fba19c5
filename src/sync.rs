//! The central cache's contention primitive.
//!
//! A test-and-set spinlock that yields the thread on contention. It never
//! sleeps or parks. The guard releases on drop, so every exit from a
//! locked region (including an unwind) unlocks.

use core::sync::atomic::{AtomicBool, Ordering};
use std::thread;

pub struct SpinLock {
    locked: AtomicBool,
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl SpinLock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_> {
        if self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.lock_slow();
        }
        SpinLockGuard { lock: self }
    }

    #[cold]
    fn lock_slow(&self) {
        while self.locked.swap(true, Ordering::Acquire) {
            thread::yield_now();
        }
    }
}

// The lock itself carries no data.
unsafe impl Send for SpinLock {}
unsafe impl Sync for SpinLock {}

/// RAII guard for [`SpinLock`]. Unlocks on drop.
pub struct SpinLockGuard<'a> {
    lock: &'a SpinLock,
}

impl Drop for SpinLockGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}
