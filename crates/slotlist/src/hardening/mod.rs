//! Fatal diagnostics.
//!
//! Nothing here allocates: messages are formatted into a fixed stack buffer
//! and written straight to fd 2 before the process aborts. By the time any of
//! these run the heap may already be corrupt, and the allocator may be the
//! global allocator.

pub mod corruption;

pub use corruption::freelist_corruption_detected;

use core::fmt;

/// Abort with a diagnostic message to stderr.
/// This is used when unrecoverable corruption is detected.
#[cold]
#[inline(never)]
pub fn abort_with_message(msg: &str) -> ! {
    write_stderr(msg.as_bytes());
    unsafe { libc::abort() }
}

/// Abort with a message built from `args`, truncated to the stack buffer.
#[cold]
#[inline(never)]
pub fn abort_with_args(args: fmt::Arguments<'_>) -> ! {
    let mut buf = StackWriter::new();
    // Truncation is the only failure mode and still leaves a useful prefix.
    let _ = fmt::write(&mut buf, args);
    abort_with_message(buf.as_str())
}

/// An allocator-internal precondition was violated.
#[cold]
#[inline(never)]
pub fn usage_fault(what: &str) -> ! {
    abort_with_args(format_args!("slotlist: usage fault: {}\n", what))
}

/// The same slot was freed twice.
#[cold]
#[inline(never)]
pub fn double_free_detected() -> ! {
    abort_with_message("slotlist: double free detected\n")
}

fn write_stderr(bytes: &[u8]) {
    unsafe {
        libc::write(2, bytes.as_ptr() as *const libc::c_void, bytes.len() as _);
    }
}

const STACK_WRITER_CAPACITY: usize = 256;

/// `fmt::Write` sink over a fixed on-stack buffer.
pub(crate) struct StackWriter {
    buf: [u8; STACK_WRITER_CAPACITY],
    len: usize,
}

impl StackWriter {
    pub(crate) const fn new() -> Self {
        Self {
            buf: [0; STACK_WRITER_CAPACITY],
            len: 0,
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        // Only whole `&str` fragments are ever copied in, so the prefix is
        // valid UTF-8 unless a fragment was cut at the capacity boundary.
        match core::str::from_utf8(&self.buf[..self.len]) {
            Ok(s) => s,
            Err(e) => {
                let valid = e.valid_up_to();
                core::str::from_utf8(&self.buf[..valid]).unwrap_or_default()
            }
        }
    }
}

impl fmt::Write for StackWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = STACK_WRITER_CAPACITY - self.len;
        let n = s.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        if n < s.len() {
            Err(fmt::Error)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    #[test]
    fn stack_writer_formats() {
        let mut w = StackWriter::new();
        write!(w, "slot_size={} word={:#x}", 64, 0xdead_usize).unwrap();
        assert_eq!(w.as_str(), "slot_size=64 word=0xdead");
    }

    #[test]
    fn stack_writer_truncates() {
        let mut w = StackWriter::new();
        let long = "x".repeat(STACK_WRITER_CAPACITY + 10);
        assert!(w.write_str(&long).is_err());
        assert_eq!(w.as_str().len(), STACK_WRITER_CAPACITY);
    }

    #[test]
    fn stack_writer_never_splits_a_char() {
        let mut w = StackWriter::new();
        let filler = "a".repeat(STACK_WRITER_CAPACITY - 1);
        w.write_str(&filler).unwrap();
        assert!(w.write_str("é").is_err());
        assert_eq!(w.as_str(), filler);
    }
}
