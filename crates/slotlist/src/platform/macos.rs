#[inline]
pub fn thread_id() -> usize {
    unsafe {
        let mut tid: u64 = 0;
        libc::pthread_threadid_np(libc::pthread_self(), &mut tid);
        tid as usize
    }
}
