//! Apple backend: `os_unfair_lock`.

use core::cell::UnsafeCell;

pub(super) const SPIN_COUNT: usize = 1000;

pub(super) struct Backend {
    lock: UnsafeCell<libc::os_unfair_lock>,
}

unsafe impl Send for Backend {}
unsafe impl Sync for Backend {}

impl Backend {
    pub(super) const fn new() -> Self {
        Self {
            lock: UnsafeCell::new(libc::OS_UNFAIR_LOCK_INIT),
        }
    }

    #[inline(always)]
    pub(super) fn try_lock(&self) -> bool {
        unsafe { libc::os_unfair_lock_trylock(self.lock.get()) }
    }

    #[cold]
    pub(super) fn lock_slow(&self) {
        unsafe { libc::os_unfair_lock_lock(self.lock.get()) }
    }

    /// # Safety
    /// The caller must hold the lock.
    #[inline(always)]
    pub(super) unsafe fn unlock(&self) {
        libc::os_unfair_lock_unlock(self.lock.get());
    }

    pub(super) fn is_locked(&self) -> Option<bool> {
        // The lock word is opaque; only ownership can be asserted, and that
        // traps instead of answering.
        None
    }

    /// # Safety
    /// No other thread may be using the lock.
    pub(super) unsafe fn reinit(&self) {
        self.lock.get().write(libc::OS_UNFAIR_LOCK_INIT);
    }
}
