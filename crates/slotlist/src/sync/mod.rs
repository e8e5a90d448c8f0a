//! The adaptive lock guarding freelists.
//!
//! We cannot use `std::sync::Mutex` because it may allocate and because the
//! blocking primitive has to be chosen per target. The layers are:
//!
//! - a per-target `Backend` (futex, `os_unfair_lock`, SRWLock,
//!   `pthread_mutex_t`, or an atomic flag), picked once at build time;
//! - [`RawMutex`]: inlined try-lock fast path, bounded spin with exponential
//!   pause backoff, then the backend's blocking slow path;
//! - [`Lock`]: records the owning thread so recursive acquisition and
//!   release by a non-owner turn into a usage fault instead of a deadlock;
//! - [`Mutex`]: data wrapper handing out RAII guards.
//!
//! No fairness is provided: a newcomer may take the lock ahead of a thread
//! that has been sleeping in the slow path.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::{config, hardening, platform};

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        mod futex;
        use futex as imp;
    } else if #[cfg(any(target_os = "macos", target_os = "ios"))] {
        mod unfair_lock;
        use unfair_lock as imp;
    } else if #[cfg(windows)] {
        mod srw_lock;
        use srw_lock as imp;
    } else if #[cfg(unix)] {
        mod pthread;
        use pthread as imp;
    } else {
        mod spin;
        use spin as imp;
    }
}

/// Upper bound on pause instructions issued between two try-locks.
const MAX_BACKOFF: usize = 16;

/// Non-recursive spin-then-block mutex with no owner tracking.
pub struct RawMutex {
    inner: imp::Backend,
}

impl RawMutex {
    pub const fn new() -> Self {
        Self {
            inner: imp::Backend::new(),
        }
    }

    /// Try to lock without blocking. Returns true if lock was acquired.
    #[inline(always)]
    pub fn try_lock(&self) -> bool {
        self.inner.try_lock()
    }

    #[inline(always)]
    pub fn lock(&self) {
        // Fast path: uncontended
        if self.inner.try_lock() {
            return;
        }
        self.lock_spin_then_block();
    }

    #[cold]
    #[inline(never)]
    fn lock_spin_then_block(&self) {
        let budget = config::spin_count(imp::SPIN_COUNT);
        let mut tries = 0;
        let mut backoff = 1;
        while tries < budget {
            if self.inner.try_lock() {
                return;
            }
            for _ in 0..backoff {
                platform::cpu_relax();
                tries += 1;
            }
            backoff = (backoff << 1).min(MAX_BACKOFF);
        }
        self.inner.lock_slow();
    }

    /// # Safety
    /// The calling thread must hold the lock.
    #[inline(always)]
    pub unsafe fn unlock(&self) {
        self.inner.unlock();
    }

    /// Whether the lock is held by anyone, if the backend can tell.
    pub fn is_locked(&self) -> Option<bool> {
        self.inner.is_locked()
    }

    /// Force the lock back to the unlocked state.
    ///
    /// # Safety
    /// No other thread may be using the lock, e.g. in a fork child handler
    /// where the holder no longer exists.
    pub unsafe fn reinit(&self) {
        self.inner.reinit();
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

/// No thread recorded as owner.
const NO_OWNER: usize = 0;

/// Owner-tracking lock: the primitive a bucket or root embeds to guard its
/// freelists.
pub struct Lock {
    raw: RawMutex,
    owner: AtomicUsize,
}

impl Lock {
    pub const fn new() -> Self {
        Self {
            raw: RawMutex::new(),
            owner: AtomicUsize::new(NO_OWNER),
        }
    }

    /// Block until the lock is held by the calling thread.
    #[inline]
    pub fn acquire(&self) {
        if config::USAGE_CHECKS {
            // Only look at the owner once the fast path failed, so the
            // uncontended case stays a single CAS.
            if !self.raw.try_lock() {
                if self.owner.load(Ordering::Relaxed) == platform::thread_id() {
                    hardening::usage_fault("recursive acquisition of a non-recursive lock");
                }
                self.raw.lock();
            }
            self.owner.store(platform::thread_id(), Ordering::Relaxed);
        } else {
            self.raw.lock();
        }
    }

    /// Take the lock if it is free. Has no side effect on failure.
    #[inline]
    pub fn try_acquire(&self) -> bool {
        if !self.raw.try_lock() {
            return false;
        }
        if config::USAGE_CHECKS {
            self.owner.store(platform::thread_id(), Ordering::Relaxed);
        }
        true
    }

    /// # Safety
    /// The calling thread must hold the lock. With `usage-checks` a violation
    /// is reported and aborts; without it the behavior is undefined.
    #[inline]
    pub unsafe fn release(&self) {
        if config::USAGE_CHECKS {
            if self.owner.load(Ordering::Relaxed) != platform::thread_id() {
                hardening::usage_fault("lock released by a thread that does not hold it");
            }
            self.owner.store(NO_OWNER, Ordering::Relaxed);
        }
        self.raw.unlock();
    }

    /// Report a usage fault unless the calling thread holds the lock.
    /// A no-op without `usage-checks`.
    #[inline]
    pub fn assert_acquired(&self) {
        if !config::USAGE_CHECKS {
            return;
        }
        if self.raw.is_locked() == Some(false)
            || self.owner.load(Ordering::Relaxed) != platform::thread_id()
        {
            hardening::usage_fault("lock is not held by the current thread");
        }
    }

    /// Acquire and return a guard that releases on drop.
    #[inline]
    pub fn lock(&self) -> LockGuard<'_> {
        self.acquire();
        LockGuard::new(self)
    }

    #[inline]
    pub fn try_lock(&self) -> Option<LockGuard<'_>> {
        if self.try_acquire() {
            Some(LockGuard::new(self))
        } else {
            None
        }
    }

    /// Reset to unlocked with no owner.
    ///
    /// # Safety
    /// Only for a fork child handler or equivalent: no other thread may be
    /// using the lock.
    pub unsafe fn reinit(&self) {
        self.owner.store(NO_OWNER, Ordering::Relaxed);
        self.raw.reinit();
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII holder of a [`Lock`].
///
/// Not `Send`: the lock must be released by the thread that took it.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a Lock,
    _not_send: PhantomData<*const ()>,
}

unsafe impl Sync for LockGuard<'_> {}

impl<'a> LockGuard<'a> {
    #[inline]
    fn new(lock: &'a Lock) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl Drop for LockGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        unsafe { self.lock.release() };
    }
}

/// A mutex that wraps data, similar to std::sync::Mutex but allocation-free.
pub struct Mutex<T> {
    lock: Lock,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub const fn new(data: T) -> Self {
        Self {
            lock: Lock::new(),
            data: UnsafeCell::new(data),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.lock.acquire();
        MutexGuard::new(self)
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        if self.lock.try_acquire() {
            Some(MutexGuard::new(self))
        } else {
            None
        }
    }

    /// The underlying lock, for `assert_acquired` in callees.
    pub fn raw(&self) -> &Lock {
        &self.lock
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

/// Not `Send`, for the same reason as [`LockGuard`].
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: Sync> Sync for MutexGuard<'_, T> {}

impl<'a, T> MutexGuard<'a, T> {
    #[inline]
    fn new(mutex: &'a Mutex<T>) -> Self {
        Self {
            mutex,
            _not_send: PhantomData,
        }
    }
}

impl<T> core::ops::Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> core::ops::DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        unsafe { self.mutex.lock.release() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn try_acquire_fails_while_held() {
        let lock = Lock::new();
        assert!(lock.try_acquire());
        lock.assert_acquired();
        assert!(!lock.try_acquire());
        unsafe { lock.release() };
        assert!(lock.try_acquire());
        unsafe { lock.release() };
    }

    #[test]
    fn try_acquire_from_other_thread_fails_while_held() {
        let lock = Arc::new(Lock::new());
        let guard = lock.lock();
        let other = Arc::clone(&lock);
        let took = std::thread::spawn(move || other.try_acquire()).join().unwrap();
        assert!(!took);
        drop(guard);
        let other = Arc::clone(&lock);
        let took = std::thread::spawn(move || {
            let ok = other.try_acquire();
            if ok {
                unsafe { other.release() };
            }
            ok
        })
        .join()
        .unwrap();
        assert!(took);
    }

    #[test]
    fn raw_mutex_spins_then_blocks() {
        let raw = Arc::new(RawMutex::new());
        raw.lock();
        let done = Arc::new(AtomicBool::new(false));
        let waiter = {
            let raw = Arc::clone(&raw);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                raw.lock();
                done.store(true, Ordering::SeqCst);
                unsafe { raw.unlock() };
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!done.load(Ordering::SeqCst));
        unsafe { raw.unlock() };
        waiter.join().unwrap();
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn mutex_guards_data() {
        let m = Mutex::new(0u32);
        {
            let mut g = m.lock();
            *g += 5;
            m.raw().assert_acquired();
            assert!(m.try_lock().is_none());
        }
        assert_eq!(*m.lock(), 5);
        assert_eq!(m.into_inner(), 5);
    }

    /// Resolves to a single impl only when `T` is not `Send`; a `Send` type
    /// makes the call below ambiguous and fails to compile.
    trait AmbiguousIfSend<A> {
        fn check() {}
    }
    impl<T: ?Sized> AmbiguousIfSend<()> for T {}
    impl<T: ?Sized + Send> AmbiguousIfSend<u8> for T {}

    #[test]
    fn guards_stay_on_the_locking_thread() {
        <LockGuard<'static> as AmbiguousIfSend<_>>::check();
        <MutexGuard<'static, u32> as AmbiguousIfSend<_>>::check();
    }

    #[test]
    fn guard_can_be_shared_for_reading() {
        let m = Mutex::new(7u32);
        let g = m.lock();
        let g = &g;
        std::thread::scope(|s| {
            s.spawn(move || assert_eq!(**g, 7));
        });
    }

    #[test]
    fn reinit_unlocks() {
        let lock = Lock::new();
        lock.acquire();
        unsafe { lock.reinit() };
        assert!(lock.try_acquire());
        unsafe { lock.release() };
    }
}
