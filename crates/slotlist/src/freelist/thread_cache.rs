//! Per-thread freelist for one slot size.
//!
//! Frees land here without taking the bucket lock; allocations pop from here
//! first. Entries may come from any span of the same pool, so links are
//! written and read with the thread-cache variants that skip the same-span
//! rule. When the bucket is full the owner flushes part of it back to the
//! spans (one lock acquisition per batch); when it is empty the owner refills
//! it from a span with [`ThreadCacheBucket::fill_from`].

use core::ptr;

use super::{FreelistEntry, SlotSpan};
use crate::encoding::{DefaultEncoder, PointerEncoder};

pub struct ThreadCacheBucket<E: PointerEncoder = DefaultEncoder> {
    freelist_head: *mut FreelistEntry<E>,
    count: usize,
    limit: usize,
    slot_size: usize,
}

impl<E: PointerEncoder> ThreadCacheBucket<E> {
    /// An empty bucket that holds at most `limit` slots of `slot_size` bytes.
    pub const fn new(slot_size: usize, limit: usize) -> Self {
        Self {
            freelist_head: ptr::null_mut(),
            count: 0,
            limit,
            slot_size,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count >= self.limit
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    #[inline]
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Cache a freed slot. Returns false, leaving the slot untouched, if the
    /// bucket is full.
    ///
    /// # Safety
    /// `slot_start` must be a free slot of `slot_size` bytes in the same pool
    /// as the slots already cached, and nothing else may use it until it is
    /// popped or flushed.
    #[inline]
    pub unsafe fn push(&mut self, slot_start: *mut u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.freelist_head =
            FreelistEntry::emplace_and_init_for_thread_cache(slot_start, self.freelist_head);
        self.count += 1;
        true
    }

    /// Take the most recently cached slot, or null if the bucket is empty.
    #[inline]
    pub fn pop(&mut self) -> *mut u8 {
        let head = self.freelist_head;
        if head.is_null() {
            return ptr::null_mut();
        }
        unsafe {
            self.freelist_head = (*head).get_next_for_thread_cache(self.slot_size);
            self.count -= 1;
            (*head).clear_for_allocation()
        }
    }

    /// Keep the `keep` most recently cached slots and hand every older one
    /// to `sink`, cleared, newest first. Returns how many were handed over.
    pub fn flush(&mut self, keep: usize, mut sink: impl FnMut(*mut u8)) -> usize {
        if self.count <= keep {
            return 0;
        }
        let mut rest = if keep == 0 {
            let rest = self.freelist_head;
            self.freelist_head = ptr::null_mut();
            rest
        } else {
            let mut last_kept = self.freelist_head;
            for _ in 1..keep {
                last_kept = unsafe { (*last_kept).get_next_for_thread_cache(self.slot_size) };
            }
            unsafe {
                let rest = (*last_kept).get_next_for_thread_cache(self.slot_size);
                (*last_kept).set_next(ptr::null_mut());
                rest
            }
        };

        let mut flushed = 0;
        while !rest.is_null() {
            unsafe {
                let next = (*rest).get_next_for_thread_cache(self.slot_size);
                sink((*rest).clear_for_allocation());
                rest = next;
            }
            flushed += 1;
        }
        self.count = keep;
        log::trace!(
            "slotlist: flushed {} slots of size {} from thread cache",
            flushed,
            self.slot_size
        );
        flushed
    }

    /// Move up to `count` slots from `span` into the bucket, stopping early
    /// when either runs out. Returns how many moved.
    ///
    /// The caller holds the lock guarding `span`.
    pub fn fill_from(&mut self, span: &mut SlotSpan<E>, count: usize) -> usize {
        let mut filled = 0;
        while filled < count && !self.is_full() {
            let slot = span.pop_for_alloc();
            if slot.is_null() {
                break;
            }
            // Cannot fail: fullness was checked above.
            unsafe { self.push(slot) };
            filled += 1;
        }
        filled
    }

    /// Validate every cached link. Returns the number of entries.
    pub fn check_free_list(&self) -> usize {
        if self.freelist_head.is_null() {
            return 0;
        }
        unsafe { (*self.freelist_head).check_free_list_for_thread_cache(self.slot_size) }
    }
}
