//! Linux/Android backend: a three-state word and the futex syscall.

use core::sync::atomic::{AtomicI32, Ordering};

const UNLOCKED: i32 = 0;
const LOCKED_UNCONTENDED: i32 = 1;
const LOCKED_CONTENDED: i32 = 2;

pub(super) const SPIN_COUNT: usize = 64;

pub(super) struct Backend {
    /// 0 = unlocked, 1 = locked no waiters, 2 = locked with (maybe) waiters
    state: AtomicI32,
}

impl Backend {
    pub(super) const fn new() -> Self {
        Self {
            state: AtomicI32::new(UNLOCKED),
        }
    }

    #[inline(always)]
    pub(super) fn try_lock(&self) -> bool {
        // Plain load first so a held lock costs no cache-line ownership.
        self.state.load(Ordering::Relaxed) == UNLOCKED
            && self
                .state
                .compare_exchange(
                    UNLOCKED,
                    LOCKED_UNCONTENDED,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_ok()
    }

    #[cold]
    pub(super) fn lock_slow(&self) {
        // A woken waiter may lose the race to a newcomer; it then sleeps
        // again. Waking up with the state forced to contended is what makes
        // the eventual release wake the next waiter.
        while self.state.swap(LOCKED_CONTENDED, Ordering::Acquire) != UNLOCKED {
            self.futex_wait();
        }
    }

    /// # Safety
    /// The caller must hold the lock.
    #[inline(always)]
    pub(super) unsafe fn unlock(&self) {
        if self.state.swap(UNLOCKED, Ordering::Release) == LOCKED_CONTENDED {
            self.futex_wake();
        }
    }

    pub(super) fn is_locked(&self) -> Option<bool> {
        Some(self.state.load(Ordering::Relaxed) != UNLOCKED)
    }

    /// # Safety
    /// No other thread may be using the lock.
    pub(super) unsafe fn reinit(&self) {
        self.state.store(UNLOCKED, Ordering::Relaxed);
    }

    fn futex_wait(&self) {
        // Returns early on EAGAIN (state changed), EINTR or spurious wakeups;
        // the caller loop re-checks the state in every case.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                &self.state as *const AtomicI32,
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                LOCKED_CONTENDED,
                core::ptr::null::<libc::timespec>(),
            );
        }
    }

    #[cold]
    fn futex_wake(&self) {
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                &self.state as *const AtomicI32,
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                1i32,
            );
        }
    }
}
