/// Check if `value` is aligned to `align`.
#[inline(always)]
pub const fn is_aligned(value: usize, align: usize) -> bool {
    value & (align - 1) == 0
}

/// log2 of the super page size. Spans never cross a super page.
pub const SUPER_PAGE_SHIFT: u32 = 21;

/// Size of a super page (2 MiB).
pub const SUPER_PAGE_SIZE: usize = 1 << SUPER_PAGE_SHIFT;

/// Bits that select the offset within a super page.
pub const SUPER_PAGE_OFFSET_MASK: usize = SUPER_PAGE_SIZE - 1;

/// Bits that select the super page itself.
pub const SUPER_PAGE_BASE_MASK: usize = !SUPER_PAGE_OFFSET_MASK;

/// Size of one partition page (16 KiB).
pub const PARTITION_PAGE_SIZE: usize = 1 << 14;

/// The first partition page of every super page holds span metadata and
/// guard pages. No slot ever starts inside it.
pub const METADATA_REGION_SIZE: usize = PARTITION_PAGE_SIZE;

/// Upper bound on slots in one span, sized for the smallest slot (16 bytes)
/// in the largest span (four partition pages).
pub const MAX_SLOTS_PER_SPAN: usize = 4 * PARTITION_PAGE_SIZE / 16;

/// Maximum number of pools the registry can hold.
pub const MAX_POOLS: usize = 4;

/// Start of the super page containing `address`.
#[inline(always)]
pub const fn super_page_base(address: usize) -> usize {
    address & SUPER_PAGE_BASE_MASK
}

/// Offset of `address` within its super page.
#[inline(always)]
pub const fn super_page_offset(address: usize) -> usize {
    address & SUPER_PAGE_OFFSET_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_check() {
        assert!(is_aligned(SUPER_PAGE_SIZE * 3, SUPER_PAGE_SIZE));
        assert!(!is_aligned(SUPER_PAGE_SIZE + 8, SUPER_PAGE_SIZE));
    }

    #[test]
    fn super_page_split() {
        let addr = 5 * SUPER_PAGE_SIZE + 0x1234;
        assert_eq!(super_page_base(addr), 5 * SUPER_PAGE_SIZE);
        assert_eq!(super_page_offset(addr), 0x1234);
        assert_eq!(super_page_base(addr) | super_page_offset(addr), addr);
    }
}
