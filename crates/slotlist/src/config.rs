use core::sync::atomic::{AtomicUsize, Ordering};

/// Every link is stored next to an inverted copy that is verified on pop.
pub const SHADOW_ENTRY: bool = cfg!(feature = "shadow-entry");

/// Allocator-internal preconditions are checked and turned into a usage
/// fault instead of being left undefined: recursive acquisition, release by
/// a non-owner, cross-span `set_next`, and the one-level double-free check.
///
/// Corruption checks on the freelist are not governed by this flag; they
/// run in every build.
pub const USAGE_CHECKS: bool = cfg!(feature = "usage-checks");

/// Cached spin budget override (0 = use the backend default).
static SPIN_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Read configuration from environment variables.
///
/// # Safety
/// Calls `libc::getenv`, which races with concurrent `setenv`. Call it from
/// the embedding allocator's init path.
pub unsafe fn read_config() {
    if let Some(val) = getenv_usize(b"SLOTLIST_SPIN_COUNT\0") {
        SPIN_COUNT.store(val, Ordering::Relaxed);
        log::debug!("slotlist: lock spin budget overridden to {}", val);
    }
}

/// Spin budget for a lock backend whose built-in budget is `default`.
#[inline]
pub fn spin_count(default: usize) -> usize {
    match SPIN_COUNT.load(Ordering::Relaxed) {
        0 => default,
        n => n,
    }
}

/// Override the spin budget directly. Passing 0 restores the defaults.
pub fn set_spin_count(count: usize) {
    SPIN_COUNT.store(count, Ordering::Relaxed);
}

/// Parse an environment variable as a usize.
///
/// # Safety
/// Calls libc::getenv.
unsafe fn getenv_usize(key: &[u8]) -> Option<usize> {
    let val = libc::getenv(key.as_ptr() as *const libc::c_char);
    if val.is_null() {
        return None;
    }
    parse_usize(core::ffi::CStr::from_ptr(val).to_bytes())
}

/// Decimal parse without allocating. Rejects empty and non-digit input.
fn parse_usize(bytes: &[u8]) -> Option<usize> {
    if bytes.is_empty() {
        return None;
    }
    let mut result: usize = 0;
    for &byte in bytes {
        if !byte.is_ascii_digit() {
            return None;
        }
        result = result.checked_mul(10)?.checked_add((byte - b'0') as usize)?;
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal() {
        assert_eq!(parse_usize(b"0"), Some(0));
        assert_eq!(parse_usize(b"1000"), Some(1000));
        assert_eq!(parse_usize(b""), None);
        assert_eq!(parse_usize(b"12a"), None);
        assert_eq!(parse_usize(b"-1"), None);
        assert_eq!(parse_usize(b"99999999999999999999999999"), None);
    }

    // One test owns the global override so parallel tests never see it.
    #[test]
    fn spin_budget_override() {
        assert_eq!(spin_count(64), 64);
        set_spin_count(5);
        assert_eq!(spin_count(64), 5);
        assert_eq!(spin_count(1000), 5);
        set_spin_count(0);
        assert_eq!(spin_count(1000), 1000);
        if std::env::var_os("SLOTLIST_SPIN_COUNT").is_none() {
            unsafe { read_config() };
            assert_eq!(spin_count(64), 64);
        }
    }
}
