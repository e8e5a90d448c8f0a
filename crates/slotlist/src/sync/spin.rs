//! Last-resort backend for targets with no blocking primitive we know of:
//! an atomic flag, with the slow path yielding the thread between attempts.

use core::sync::atomic::{AtomicBool, Ordering};

pub(super) const SPIN_COUNT: usize = 1000;

pub(super) struct Backend {
    locked: AtomicBool,
}

impl Backend {
    pub(super) const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    #[inline(always)]
    pub(super) fn try_lock(&self) -> bool {
        !self.locked.load(Ordering::Relaxed)
            && self
                .locked
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }

    #[cold]
    pub(super) fn lock_slow(&self) {
        while !self.try_lock() {
            std::thread::yield_now();
        }
    }

    /// # Safety
    /// The caller must hold the lock.
    #[inline(always)]
    pub(super) unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    pub(super) fn is_locked(&self) -> Option<bool> {
        Some(self.locked.load(Ordering::Relaxed))
    }

    /// # Safety
    /// No other thread may be using the lock.
    pub(super) unsafe fn reinit(&self) {
        self.locked.store(false, Ordering::Relaxed);
    }
}
