//! Generic Unix backend: `pthread_mutex_t`.
//!
//! The mutex must not move once it has been locked; every `RawMutex` lives
//! inside a bucket or root that is itself pinned in memory by its owner.

use core::cell::UnsafeCell;

pub(super) const SPIN_COUNT: usize = 1000;

pub(super) struct Backend {
    lock: UnsafeCell<libc::pthread_mutex_t>,
}

unsafe impl Send for Backend {}
unsafe impl Sync for Backend {}

impl Backend {
    pub(super) const fn new() -> Self {
        Self {
            lock: UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER),
        }
    }

    #[inline(always)]
    pub(super) fn try_lock(&self) -> bool {
        unsafe { libc::pthread_mutex_trylock(self.lock.get()) == 0 }
    }

    #[cold]
    pub(super) fn lock_slow(&self) {
        let ret = unsafe { libc::pthread_mutex_lock(self.lock.get()) };
        if ret != 0 {
            crate::hardening::abort_with_message("slotlist: pthread_mutex_lock failed\n");
        }
    }

    /// # Safety
    /// The caller must hold the lock.
    #[inline(always)]
    pub(super) unsafe fn unlock(&self) {
        libc::pthread_mutex_unlock(self.lock.get());
    }

    pub(super) fn is_locked(&self) -> Option<bool> {
        None
    }

    /// # Safety
    /// No other thread may be using the lock.
    pub(super) unsafe fn reinit(&self) {
        self.lock.get().write(libc::PTHREAD_MUTEX_INITIALIZER);
    }
}
