//! Freelist bookkeeping for one slot span.
//!
//! The bucket layer decides which span to use and when to map memory; this
//! type owns the span's freelist head and the counters that the freelist
//! operations keep consistent. Mutate it only while holding the lock of the
//! bucket it belongs to (typically by keeping it inside a
//! [`crate::sync::Mutex`]).

use core::ptr;

use super::FreelistEntry;
use crate::encoding::{DefaultEncoder, PointerEncoder};
use crate::platform::mte::untag;
use crate::util::{
    super_page_base, super_page_offset, MAX_SLOTS_PER_SPAN, METADATA_REGION_SIZE, SUPER_PAGE_SIZE,
};
use crate::{config, hardening};

const BITMAP_WORDS: usize = MAX_SLOTS_PER_SPAN / 64;

pub struct SlotSpan<E: PointerEncoder = DefaultEncoder> {
    freelist_head: *mut FreelistEntry<E>,
    span_start: usize,
    slot_size: usize,
    num_provisioned_slots: usize,
    num_allocated_slots: usize,
    freelist_is_sorted: bool,
}

unsafe impl<E: PointerEncoder> Send for SlotSpan<E> {}

impl<E: PointerEncoder> SlotSpan<E> {
    /// An empty span whose slots start at `span_start`. Nothing is
    /// provisioned yet.
    ///
    /// # Safety
    /// `span_start` must stay valid, writable memory for every slot later
    /// provisioned, for as long as the span is used.
    ///
    /// # Panics
    /// If `slot_size` cannot hold an entry or is not word-aligned, or if
    /// `span_start` lies inside a super page's metadata region.
    pub unsafe fn new(span_start: *mut u8, slot_size: usize) -> Self {
        let start = untag(span_start as usize);
        assert!(slot_size >= FreelistEntry::<E>::SIZE, "slot too small for a freelist entry");
        assert!(slot_size % core::mem::size_of::<usize>() == 0, "slot size not word-aligned");
        assert!(super_page_offset(start) >= METADATA_REGION_SIZE, "span starts in metadata");
        Self {
            freelist_head: ptr::null_mut(),
            span_start: span_start as usize,
            slot_size,
            num_provisioned_slots: 0,
            num_allocated_slots: 0,
            freelist_is_sorted: true,
        }
    }

    #[inline]
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    #[inline]
    pub fn span_start(&self) -> *mut u8 {
        self.span_start as *mut u8
    }

    #[inline]
    pub fn freelist_head(&self) -> *mut FreelistEntry<E> {
        self.freelist_head
    }

    #[inline]
    pub fn num_allocated_slots(&self) -> usize {
        self.num_allocated_slots
    }

    #[inline]
    pub fn num_provisioned_slots(&self) -> usize {
        self.num_provisioned_slots
    }

    #[inline]
    pub fn freelist_is_sorted(&self) -> bool {
        self.freelist_is_sorted
    }

    /// Address of slot `index`.
    #[inline]
    fn slot_address(&self, index: usize) -> usize {
        self.span_start + index * self.slot_size
    }

    /// Carve `count` more slots off the end of the provisioned area and
    /// put them on the freelist in address order, ahead of existing entries.
    ///
    /// # Panics
    /// If the span would exceed [`MAX_SLOTS_PER_SPAN`] slots or leave its
    /// super page.
    pub fn provision(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let first = self.num_provisioned_slots;
        let end = first + count;
        assert!(end <= MAX_SLOTS_PER_SPAN, "span exceeds its slot limit");
        assert!(
            super_page_offset(untag(self.span_start)) + end * self.slot_size <= SUPER_PAGE_SIZE,
            "span leaves its super page"
        );

        let old_head = self.freelist_head;
        let mut prev: *mut FreelistEntry<E> = ptr::null_mut();
        for index in first..end {
            let slot = self.slot_address(index) as *mut u8;
            let entry = unsafe { FreelistEntry::<E>::emplace_and_init_null(slot) };
            if prev.is_null() {
                self.freelist_head = entry;
            } else {
                unsafe { (*prev).set_next(entry) };
            }
            prev = entry;
        }
        unsafe { (*prev).set_next(old_head) };

        self.num_provisioned_slots = end;
        // Fresh slots come out sorted; prepending them to older entries
        // does not.
        self.freelist_is_sorted = old_head.is_null();
    }

    /// Pop the head of the freelist for allocation. Returns null when the
    /// freelist is empty. The returned slot carries no link bits.
    #[inline]
    pub fn pop_for_alloc(&mut self) -> *mut u8 {
        let head = self.freelist_head;
        if head.is_null() {
            return ptr::null_mut();
        }
        unsafe {
            self.freelist_head = (*head).get_next(self.slot_size);
            self.num_allocated_slots += 1;
            (*head).clear_for_allocation()
        }
    }

    /// Return `slot_start` to the freelist. Returns true if the span now has
    /// no allocated slots.
    ///
    /// An immediate double free (freeing the current head) is always
    /// detected and aborts.
    ///
    /// # Safety
    /// `slot_start` must be a slot of this span obtained from
    /// [`pop_for_alloc`](Self::pop_for_alloc).
    pub unsafe fn free(&mut self, slot_start: *mut u8) -> bool {
        let entry = slot_start as *mut FreelistEntry<E>;
        if entry == self.freelist_head {
            hardening::double_free_detected();
        }
        if config::USAGE_CHECKS {
            self.check_owned_slot(slot_start as usize);
            // One level deeper than the always-on check.
            let head = self.freelist_head;
            if !head.is_null() && entry == (*head).get_next(self.slot_size) {
                hardening::double_free_detected();
            }
        }
        if self.num_allocated_slots == 0 {
            hardening::double_free_detected();
        }
        (*entry).set_next(self.freelist_head);
        self.freelist_head = entry;
        self.freelist_is_sorted = false;
        self.num_allocated_slots -= 1;
        self.num_allocated_slots == 0
    }

    /// Splice a chain of `count` freed entries, already linked from `head`
    /// to `tail`, in front of the freelist.
    ///
    /// # Safety
    /// Every entry of the chain must be an allocated slot of this span, and
    /// `tail` must be null-terminated.
    pub unsafe fn append_free_list(
        &mut self,
        head: *mut FreelistEntry<E>,
        tail: *mut FreelistEntry<E>,
        count: usize,
    ) {
        if count == 0 {
            return;
        }
        if config::USAGE_CHECKS {
            if !(*tail).get_next(self.slot_size).is_null() {
                hardening::usage_fault("appended chain is not null-terminated");
            }
            let mut seen = 0;
            let mut entry = head;
            while !entry.is_null() {
                self.check_owned_slot(entry as usize);
                seen += 1;
                entry = (*entry).get_next(self.slot_size);
            }
            if seen != count {
                hardening::usage_fault("appended chain length does not match its count");
            }
        }
        if self.num_allocated_slots < count {
            hardening::double_free_detected();
        }
        (*tail).set_next(self.freelist_head);
        self.freelist_head = head;
        self.freelist_is_sorted = false;
        self.num_allocated_slots -= count;
    }

    /// Replace the freelist head.
    ///
    /// # Safety
    /// `new_head` must be null or a valid freelist of this span.
    pub unsafe fn set_freelist_head(&mut self, new_head: *mut FreelistEntry<E>) {
        if config::USAGE_CHECKS
            && !new_head.is_null()
            && super_page_base(untag(new_head as usize)) != super_page_base(untag(self.span_start))
        {
            hardening::usage_fault("freelist head outside the span's super page");
        }
        self.freelist_head = new_head;
        self.freelist_is_sorted = false;
    }

    /// Rebuild the freelist in ascending address order, so that allocation
    /// keeps reusing the lowest slots and the tail of the span can drain.
    ///
    /// Uses an on-stack bitmap; a slot seen twice while walking means the
    /// list loops back on itself, which only a double free produces.
    pub fn sort_freelist(&mut self) {
        if self.freelist_is_sorted || self.freelist_head.is_null() {
            self.freelist_is_sorted = true;
            return;
        }

        let mut free_slots = [0u64; BITMAP_WORDS];
        let mut num_free = 0usize;
        let mut entry = self.freelist_head;
        while !entry.is_null() {
            let index = self.slot_index(entry as usize);
            let (word, bit) = (index / 64, index % 64);
            if free_slots[word] & (1 << bit) != 0 {
                hardening::double_free_detected();
            }
            free_slots[word] |= 1 << bit;
            num_free += 1;
            entry = unsafe { (*entry).get_next(self.slot_size) };
        }

        let mut prev: *mut FreelistEntry<E> = ptr::null_mut();
        for index in 0..self.num_provisioned_slots {
            if free_slots[index / 64] & (1 << (index % 64)) == 0 {
                continue;
            }
            let slot = self.slot_address(index) as *mut u8;
            let entry = unsafe { FreelistEntry::<E>::emplace_and_init_null(slot) };
            if prev.is_null() {
                self.freelist_head = entry;
            } else {
                unsafe { (*prev).set_next(entry) };
            }
            prev = entry;
        }
        self.freelist_is_sorted = true;
        log::trace!(
            "slotlist: sorted freelist of span {:#x} ({} free slots)",
            self.span_start,
            num_free
        );
    }

    /// Validate every link of the freelist. Returns the number of entries.
    pub fn check_free_list(&self) -> usize {
        if self.freelist_head.is_null() {
            return 0;
        }
        unsafe { (*self.freelist_head).check_free_list(self.slot_size) }
    }

    /// Index of the provisioned slot starting at `address`, or a usage fault.
    fn slot_index(&self, address: usize) -> usize {
        let offset = untag(address).wrapping_sub(untag(self.span_start));
        let index = offset / self.slot_size;
        if offset % self.slot_size != 0 || index >= self.num_provisioned_slots {
            hardening::usage_fault("slot does not belong to this span");
        }
        index
    }

    fn check_owned_slot(&self, address: usize) {
        self.slot_index(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::__test_support::Region;
    use crate::encoding::WholePointer;

    type Span = SlotSpan<WholePointer>;

    fn span(region: &Region, slot_size: usize) -> Span {
        unsafe { Span::new(region.span_start(0), slot_size) }
    }

    #[test]
    fn provision_then_allocate_in_address_order() {
        let region = Region::super_pages(1);
        let mut s = span(&region, 32);
        s.provision(4);
        assert_eq!(s.check_free_list(), 4);
        assert!(s.freelist_is_sorted());
        for i in 0..4 {
            let p = s.pop_for_alloc();
            assert_eq!(p as usize, region.span_start(0) as usize + i * 32);
        }
        assert!(s.pop_for_alloc().is_null());
        assert_eq!(s.num_allocated_slots(), 4);
    }

    #[test]
    fn allocated_slots_carry_no_link_bits() {
        let region = Region::super_pages(1);
        let mut s = span(&region, 32);
        s.provision(3);
        let p = s.pop_for_alloc();
        let bytes = unsafe { core::slice::from_raw_parts(p, FreelistEntry::<WholePointer>::SIZE) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn free_is_lifo_and_reports_empty() {
        let region = Region::super_pages(1);
        let mut s = span(&region, 64);
        s.provision(3);
        let a = s.pop_for_alloc();
        let b = s.pop_for_alloc();
        unsafe {
            assert!(!s.free(a));
            assert!(!s.freelist_is_sorted());
            assert!(s.free(b));
        }
        assert_eq!(s.num_allocated_slots(), 0);
        assert_eq!(s.pop_for_alloc(), b);
        assert_eq!(s.pop_for_alloc(), a);
        assert_eq!(s.check_free_list(), 1);
    }

    #[test]
    fn sort_restores_address_order() {
        let region = Region::super_pages(1);
        let mut s = span(&region, 48);
        s.provision(8);
        let slots: Vec<_> = (0..8).map(|_| s.pop_for_alloc()).collect();
        for &i in &[5usize, 1, 7, 3] {
            unsafe { s.free(slots[i]) };
        }
        assert_eq!(s.freelist_head() as *mut u8, slots[3]);
        s.sort_freelist();
        assert!(s.freelist_is_sorted());
        for &i in &[1usize, 3, 5, 7] {
            assert_eq!(s.pop_for_alloc(), slots[i]);
        }
        assert!(s.pop_for_alloc().is_null());
    }

    #[test]
    fn provision_after_frees_prepends_fresh_slots() {
        let region = Region::super_pages(1);
        let mut s = span(&region, 32);
        s.provision(2);
        let a = s.pop_for_alloc();
        unsafe { s.free(a) };
        s.provision(2);
        assert!(!s.freelist_is_sorted());
        assert_eq!(s.check_free_list(), 4);
        assert_eq!(s.num_provisioned_slots(), 4);
        s.sort_freelist();
        assert_eq!(s.pop_for_alloc(), a);
    }

    #[test]
    fn append_chain_from_elsewhere() {
        let region = Region::super_pages(1);
        let mut s = span(&region, 32);
        s.provision(4);
        let slots: Vec<_> = (0..4).map(|_| s.pop_for_alloc()).collect();
        unsafe {
            let tail = FreelistEntry::<WholePointer>::emplace_and_init_null(slots[2]);
            let head = FreelistEntry::<WholePointer>::emplace_and_init_null(slots[0]);
            (*head).set_next(tail);
            s.append_free_list(head, tail, 2);
        }
        assert_eq!(s.num_allocated_slots(), 2);
        assert_eq!(s.check_free_list(), 2);
        assert_eq!(s.pop_for_alloc(), slots[0]);
        assert_eq!(s.pop_for_alloc(), slots[2]);
    }

    #[test]
    fn replace_head() {
        let region = Region::super_pages(1);
        let mut s = span(&region, 32);
        s.provision(4);
        let second = unsafe { s.freelist_head().cast::<u8>().add(32) };
        unsafe { s.set_freelist_head(second.cast()) };
        assert_eq!(s.check_free_list(), 3);
        assert!(!s.freelist_is_sorted());
        unsafe { s.set_freelist_head(ptr::null_mut()) };
        assert!(s.pop_for_alloc().is_null());
    }

    #[test]
    #[should_panic(expected = "slot too small")]
    fn rejects_tiny_slots() {
        let region = Region::super_pages(1);
        let _ = span(&region, core::mem::size_of::<usize>() / 2);
    }
}
