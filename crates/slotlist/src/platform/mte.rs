//! ARM64 Memory Tagging Extension (MTE) pointer tags.
//!
//! With MTE, bits 56..=59 of a pointer carry the allocation tag. The tag is
//! part of the pointer the caller holds, but not of the address: span and
//! pool membership are computed on the untagged value, and the pool-offset
//! encoder carries the tag through encode/decode untouched.
//!
//! On every other target the mask is zero and all helpers are identities.

#[cfg(all(target_arch = "aarch64", target_pointer_width = "64"))]
pub const TAG_MASK: usize = 0x0f00_0000_0000_0000;

#[cfg(not(all(target_arch = "aarch64", target_pointer_width = "64")))]
pub const TAG_MASK: usize = 0;

/// Strip the hardware tag from `address`.
#[inline(always)]
pub const fn untag(address: usize) -> usize {
    address & !TAG_MASK
}

/// Only the hardware tag bits of `address`.
#[inline(always)]
pub const fn tag_bits(address: usize) -> usize {
    address & TAG_MASK
}
