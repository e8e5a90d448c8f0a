#[inline]
pub fn thread_id() -> usize {
    // Thread ids are never 0 on Windows.
    unsafe { winapi::um::processthreadsapi::GetCurrentThreadId() as usize }
}
