//! Aligned scratch memory for tests, benchmarks and fuzzing.
//!
//! Not part of the supported API.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::sync::OnceLock;

use crate::encoding::{register_pool, PoolHandle};
use crate::util::{METADATA_REGION_SIZE, SUPER_PAGE_SIZE};

/// A zeroed, size-aligned heap region standing in for reserved super pages.
pub struct Region {
    ptr: *mut u8,
    layout: Layout,
}

unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// `count` contiguous super pages, aligned to one super page.
    pub fn super_pages(count: usize) -> Self {
        Self::aligned(count * SUPER_PAGE_SIZE, SUPER_PAGE_SIZE)
    }

    /// `size` bytes aligned to `align`.
    pub fn aligned(size: usize, align: usize) -> Self {
        let layout = Layout::from_size_align(size, align).expect("bad region layout");
        let ptr = unsafe { alloc_zeroed(layout) };
        assert!(!ptr.is_null(), "region allocation failed");
        Self { ptr, layout }
    }

    pub fn base(&self) -> usize {
        self.ptr as usize
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Address `offset` bytes into super page `super_page`.
    pub fn slot(&self, super_page: usize, offset: usize) -> *mut u8 {
        assert!(offset < SUPER_PAGE_SIZE);
        assert!((super_page + 1) * SUPER_PAGE_SIZE <= self.size());
        unsafe { self.ptr.add(super_page * SUPER_PAGE_SIZE + offset) }
    }

    /// First byte past the metadata region of super page `super_page`:
    /// where a span's slots begin.
    pub fn span_start(&self, super_page: usize) -> *mut u8 {
        self.slot(super_page, METADATA_REGION_SIZE)
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr, self.layout) };
    }
}

/// Super pages in the shared test pool.
pub const SHARED_POOL_SUPER_PAGES: usize = 4;

/// A process-wide pool of [`SHARED_POOL_SUPER_PAGES`] super pages,
/// registered on first use and never unregistered.
pub fn shared_pool() -> &'static (Region, PoolHandle) {
    static POOL: OnceLock<(Region, PoolHandle)> = OnceLock::new();
    POOL.get_or_init(|| {
        let size = SHARED_POOL_SUPER_PAGES * SUPER_PAGE_SIZE;
        let region = Region::aligned(size, size);
        let handle = register_pool(region.base(), size).expect("shared pool registration");
        (region, handle)
    })
}
