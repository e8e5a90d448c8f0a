/// Get a cheap thread identifier.
/// Cached in TLS to avoid a syscall on every slow-path lock acquisition.
#[inline]
pub fn thread_id() -> usize {
    use std::cell::Cell;

    thread_local! {
        static CACHED_TID: Cell<usize> = const { Cell::new(0) };
    }

    CACHED_TID
        .try_with(|tid| {
            let cached = tid.get();
            if cached != 0 {
                return cached;
            }
            let new_tid = gettid();
            tid.set(new_tid);
            new_tid
        })
        // TLS already torn down on this thread: ask the kernel every time.
        .unwrap_or_else(|_| gettid())
}

#[inline]
fn gettid() -> usize {
    unsafe { libc::syscall(libc::SYS_gettid) as usize }
}
