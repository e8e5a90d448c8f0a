//! Windows backend: an exclusive-only SRWLock.

use core::cell::UnsafeCell;
use winapi::um::synchapi::{
    AcquireSRWLockExclusive, ReleaseSRWLockExclusive, TryAcquireSRWLockExclusive, SRWLOCK,
    SRWLOCK_INIT,
};

pub(super) const SPIN_COUNT: usize = 64;

pub(super) struct Backend {
    lock: UnsafeCell<SRWLOCK>,
}

unsafe impl Send for Backend {}
unsafe impl Sync for Backend {}

impl Backend {
    pub(super) const fn new() -> Self {
        Self {
            lock: UnsafeCell::new(SRWLOCK_INIT),
        }
    }

    #[inline(always)]
    pub(super) fn try_lock(&self) -> bool {
        unsafe { TryAcquireSRWLockExclusive(self.lock.get()) != 0 }
    }

    #[cold]
    pub(super) fn lock_slow(&self) {
        unsafe { AcquireSRWLockExclusive(self.lock.get()) }
    }

    /// # Safety
    /// The caller must hold the lock.
    #[inline(always)]
    pub(super) unsafe fn unlock(&self) {
        ReleaseSRWLockExclusive(self.lock.get());
    }

    pub(super) fn is_locked(&self) -> Option<bool> {
        // A null SRWLock word means nobody holds it.
        Some(unsafe { !(*self.lock.get()).Ptr.is_null() })
    }

    /// # Safety
    /// No other thread may be using the lock.
    pub(super) unsafe fn reinit(&self) {
        self.lock.get().write(SRWLOCK_INIT);
    }
}
