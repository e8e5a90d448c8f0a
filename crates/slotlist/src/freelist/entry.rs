use core::marker::PhantomData;
use core::ptr;

use crate::encoding::{DefaultEncoder, PointerEncoder};
use crate::platform::{self, mte::untag};
use crate::transform::invert;
use crate::util::{super_page_base, super_page_offset, METADATA_REGION_SIZE};
use crate::{config, hardening};

/// A free slot's link to the next free slot, placed at the start of the
/// slot's own memory.
///
/// Entries are never created by value: they are emplaced over free slots
/// with [`emplace_and_init_null`](Self::emplace_and_init_null) or
/// [`emplace_and_init_for_thread_cache`](Self::emplace_and_init_for_thread_cache)
/// and handed around as raw pointers, null meaning "end of list".
///
/// Every pop through `get_next*` validates the link; a malformed one
/// aborts the process.
#[repr(C)]
pub struct FreelistEntry<E: PointerEncoder = DefaultEncoder> {
    encoded_next: usize,
    /// Always `invert(encoded_next)`.
    #[cfg(feature = "shadow-entry")]
    shadow: usize,
    _encoder: PhantomData<E>,
}

/// Entry type for the encoder chosen for this target.
pub type DefaultFreelistEntry = FreelistEntry<DefaultEncoder>;

impl<E: PointerEncoder> FreelistEntry<E> {
    /// Bytes an entry occupies at the start of a free slot.
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Place a list terminator at `slot_start`.
    ///
    /// # Safety
    /// `slot_start` must be a free slot, writable for `Self::SIZE` bytes and
    /// aligned to `usize`.
    #[inline]
    pub unsafe fn emplace_and_init_null(slot_start: *mut u8) -> *mut Self {
        let entry = slot_start as *mut Self;
        entry.write(Self::with_encoded(E::NULL));
        entry
    }

    /// Place an entry at `slot_start` linking to `next`. The two may sit in
    /// different spans: thread caches mix slots from many spans.
    ///
    /// # Safety
    /// As for [`emplace_and_init_null`](Self::emplace_and_init_null); `next`
    /// must be null or another free slot of the same pool.
    #[inline]
    pub unsafe fn emplace_and_init_for_thread_cache(
        slot_start: *mut u8,
        next: *mut Self,
    ) -> *mut Self {
        let entry = slot_start as *mut Self;
        entry.write(Self::with_encoded(Self::encode(next)));
        entry
    }

    #[inline(always)]
    fn with_encoded(encoded_next: usize) -> Self {
        Self {
            encoded_next,
            #[cfg(feature = "shadow-entry")]
            shadow: invert(encoded_next),
            _encoder: PhantomData,
        }
    }

    #[inline(always)]
    fn encode(next: *mut Self) -> usize {
        if next.is_null() {
            E::NULL
        } else {
            E::encode(next as usize)
        }
    }

    #[inline(always)]
    fn address(&self) -> usize {
        self as *const Self as usize
    }

    /// Link this entry to `next` (null terminates the list).
    ///
    /// Regular freelists never leave their super page. With usage checks on,
    /// a cross-span link is reported as an allocator bug.
    #[inline]
    pub fn set_next(&mut self, next: *mut Self) {
        if config::USAGE_CHECKS
            && !next.is_null()
            && super_page_base(untag(self.address())) != super_page_base(untag(next as usize))
        {
            hardening::usage_fault("set_next links entries in different super pages");
        }
        self.store(Self::encode(next));
    }

    #[inline(always)]
    fn store(&mut self, encoded: usize) {
        self.encoded_next = encoded;
        #[cfg(feature = "shadow-entry")]
        {
            self.shadow = invert(encoded);
        }
    }

    /// Decode and validate the link. Returns null at the end of the list.
    ///
    /// # Safety
    /// `self` must be an entry of a freelist whose every node is a free slot
    /// of `slot_size` bytes. Corrupted links are caught and abort; they do
    /// not make this call unsound.
    #[inline]
    pub unsafe fn get_next(&self, slot_size: usize) -> *mut Self {
        self.get_next_internal::<false>(slot_size)
    }

    /// Like [`get_next`](Self::get_next), but tolerates a next entry in a
    /// different span.
    ///
    /// # Safety
    /// See [`get_next`](Self::get_next).
    #[inline]
    pub unsafe fn get_next_for_thread_cache(&self, slot_size: usize) -> *mut Self {
        self.get_next_internal::<true>(slot_size)
    }

    #[inline(always)]
    unsafe fn get_next_internal<const FOR_THREAD_CACHE: bool>(
        &self,
        slot_size: usize,
    ) -> *mut Self {
        // Discarded pages read back as zero: treat that as the end of the
        // list, same as an explicit terminator, with no further checks.
        if self.is_encoded_next_ptr_zero() || self.encoded_next == E::NULL {
            return ptr::null_mut();
        }
        let next = E::decode(self.address(), self.encoded_next);
        if !self.is_well_formed::<FOR_THREAD_CACHE>(next) {
            hardening::freelist_corruption_detected(
                slot_size,
                self.encoded_next,
                self.shadow_word(),
            );
        }
        // The caller is about to hand out `self` and read `next` as the new
        // head; start the load now.
        platform::prefetch(next);
        next as *mut Self
    }

    #[inline(always)]
    fn is_well_formed<const FOR_THREAD_CACHE: bool>(&self, next: usize) -> bool {
        let here = untag(self.address());
        let next_untagged = untag(next);

        let shadow_ok = self.shadow_matches();
        let not_in_metadata = super_page_offset(next_untagged) >= METADATA_REGION_SIZE;
        let same_pool = E::is_same_pool(here, next);
        let same_super_page =
            FOR_THREAD_CACHE || super_page_base(here) == super_page_base(next_untagged);

        shadow_ok & not_in_metadata & same_pool & same_super_page
    }

    #[inline(always)]
    fn shadow_matches(&self) -> bool {
        #[cfg(feature = "shadow-entry")]
        {
            self.shadow == invert(self.encoded_next)
        }
        #[cfg(not(feature = "shadow-entry"))]
        {
            true
        }
    }

    #[inline(always)]
    fn shadow_word(&self) -> Option<usize> {
        #[cfg(feature = "shadow-entry")]
        {
            Some(self.shadow)
        }
        #[cfg(not(feature = "shadow-entry"))]
        {
            None
        }
    }

    /// Zero the entry before the slot goes back to a caller and return the
    /// slot start. No link bits leak into user-visible memory.
    #[inline]
    pub fn clear_for_allocation(&mut self) -> *mut u8 {
        self.encoded_next = 0;
        #[cfg(feature = "shadow-entry")]
        {
            self.shadow = 0;
        }
        self as *mut Self as *mut u8
    }

    /// True when the stored link word is all zero bits.
    ///
    /// A zero word reads back as "no next", so the page holding such an
    /// entry may be discarded without breaking the list.
    #[inline(always)]
    pub fn is_encoded_next_ptr_zero(&self) -> bool {
        self.encoded_next == 0
    }

    /// Walk the whole list from `self`, validating every link, and return
    /// its length. Aborts on the first malformed link.
    ///
    /// # Safety
    /// See [`get_next`](Self::get_next).
    pub unsafe fn check_free_list(&self, slot_size: usize) -> usize {
        self.check_free_list_internal::<false>(slot_size)
    }

    /// [`check_free_list`](Self::check_free_list) with thread-cache rules.
    ///
    /// # Safety
    /// See [`get_next`](Self::get_next).
    pub unsafe fn check_free_list_for_thread_cache(&self, slot_size: usize) -> usize {
        self.check_free_list_internal::<true>(slot_size)
    }

    unsafe fn check_free_list_internal<const FOR_THREAD_CACHE: bool>(
        &self,
        slot_size: usize,
    ) -> usize {
        let mut count = 1;
        let mut entry = self.get_next_internal::<FOR_THREAD_CACHE>(slot_size);
        while !entry.is_null() {
            count += 1;
            entry = (*entry).get_next_internal::<FOR_THREAD_CACHE>(slot_size);
        }
        count
    }

    /// Overwrite the link with `transform(value)` while leaving the shadow
    /// stale, so the next `get_next*` through this entry sees a corrupted
    /// link. Callers pick a `value` that is not a valid slot address.
    pub fn corrupt_next_for_testing(&mut self, value: usize) {
        self.encoded_next = crate::transform::transform(value);
    }

    /// Raw stored link word.
    pub fn encoded_next_for_testing(&self) -> usize {
        self.encoded_next
    }

    /// Raw stored shadow word, if the build has one.
    pub fn shadow_for_testing(&self) -> Option<usize> {
        self.shadow_word()
    }
}
