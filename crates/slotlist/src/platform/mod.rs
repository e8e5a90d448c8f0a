cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        pub mod linux;
        pub use linux as sys;
    } else if #[cfg(any(target_os = "macos", target_os = "ios"))] {
        pub mod macos;
        pub use macos as sys;
    } else if #[cfg(windows)] {
        pub mod windows;
        pub use windows as sys;
    } else {
        pub mod fallback;
        pub use fallback as sys;
    }
}

pub mod mte;

/// Get a cheap, non-zero identifier for the calling thread.
///
/// Used only to detect a thread re-acquiring a lock it already owns, so it
/// needs to be unique among live threads, not stable across thread reuse.
#[inline]
pub fn thread_id() -> usize {
    sys::thread_id()
}

/// Hint the CPU to pull the cache line at `address` in for reading.
#[inline(always)]
pub fn prefetch(address: usize) {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use core::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
        _mm_prefetch::<_MM_HINT_T0>(address as *const i8);
    }
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!(
            "prfm pldl1keep, [{addr}]",
            addr = in(reg) address,
            options(nostack, preserves_flags, readonly),
        );
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    let _ = address;
}

/// One pause instruction for spin-wait loops.
#[inline(always)]
pub fn cpu_relax() {
    core::hint::spin_loop();
}
