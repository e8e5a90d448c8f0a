use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::PointerEncoder;
use crate::platform::mte::{untag, TAG_MASK};
use crate::sync::Lock;
use crate::transform::transform;
use crate::util::{is_aligned, MAX_POOLS, SUPER_PAGE_SIZE};

/// A contiguous, size-aligned reservation that spans are carved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pool {
    pub base: usize,
    /// `!(size - 1)`: the bits that are identical for every address in the pool.
    pub base_mask: usize,
}

impl Pool {
    #[inline(always)]
    pub const fn size(&self) -> usize {
        (!self.base_mask).wrapping_add(1)
    }

    /// Whether the (possibly tagged) `address` lies inside the pool.
    #[inline(always)]
    pub const fn contains(&self, address: usize) -> bool {
        untag(address) & self.base_mask == self.base
    }
}

/// Maps an address to the pool that owns it.
pub trait PoolLookup {
    fn pool_of(address: usize) -> Option<Pool>;
}

/// Encoder storing `transform(offset | tag)` and rebuilding the address from
/// the pool of the entry being read.
pub struct PoolOffset<L: PoolLookup = RegisteredPools> {
    _lookup: PhantomData<L>,
}

impl<L: PoolLookup> PoolOffset<L> {
    #[inline(always)]
    fn pool_or_abort(address: usize) -> Pool {
        match L::pool_of(untag(address)) {
            Some(pool) => pool,
            None => crate::hardening::abort_with_args(format_args!(
                "slotlist: freelist entry {:#x} is outside every pool\n",
                address
            )),
        }
    }
}

impl<L: PoolLookup> PointerEncoder for PoolOffset<L> {
    // Offset 0 is the pool base, which sits in a super page's metadata
    // region and is never a slot.
    const NULL: usize = 0;

    #[inline(always)]
    fn encode(next: usize) -> usize {
        let pool = Self::pool_or_abort(next);
        transform(next & (TAG_MASK | !pool.base_mask))
    }

    #[inline(always)]
    fn decode(here: usize, encoded: usize) -> usize {
        // Whatever the stored bits, the result carries this pool's base.
        Self::pool_or_abort(here).base | transform(encoded)
    }

    #[inline(always)]
    fn is_same_pool(here: usize, next: usize) -> bool {
        Self::pool_or_abort(here).contains(next)
    }
}

/// Lookup through the process-wide registry filled by [`register_pool`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisteredPools;

impl PoolLookup for RegisteredPools {
    #[inline(always)]
    fn pool_of(address: usize) -> Option<Pool> {
        pool_of(address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("pool size {0:#x} is not a power of two")]
    NotPowerOfTwo(usize),
    #[error("pool size {0:#x} is smaller than a super page")]
    TooSmall(usize),
    #[error("pool base {base:#x} is null, tagged, or not aligned to its size {size:#x}")]
    Misaligned { base: usize, size: usize },
    #[error("pool at {0:#x} overlaps a registered pool")]
    Overlap(usize),
    #[error("the pool table is full")]
    Full,
}

/// Proof of registration, consumed by [`unregister_pool`].
#[derive(Debug)]
pub struct PoolHandle {
    index: usize,
    pool: Pool,
}

impl PoolHandle {
    pub fn pool(&self) -> Pool {
        self.pool
    }
}

struct PoolSlot {
    /// 0 = free slot.
    base: AtomicUsize,
    base_mask: AtomicUsize,
}

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: PoolSlot = PoolSlot {
    base: AtomicUsize::new(0),
    base_mask: AtomicUsize::new(0),
};

static POOLS: [PoolSlot; MAX_POOLS] = [EMPTY_SLOT; MAX_POOLS];

/// Serializes writers. Readers never take it.
static REGISTRY_LOCK: Lock = Lock::new();

/// Find the registered pool containing `address` (untagged). Lock-free.
#[inline]
pub fn pool_of(address: usize) -> Option<Pool> {
    for slot in &POOLS {
        let base = slot.base.load(Ordering::Acquire);
        if base == 0 {
            continue;
        }
        let base_mask = slot.base_mask.load(Ordering::Acquire);
        if address & base_mask == base {
            return Some(Pool { base, base_mask });
        }
    }
    None
}

/// Register `[base, base + size)` as a pool.
///
/// `size` must be a power of two no smaller than a super page, and `base`
/// must be non-null, untagged and aligned to `size`.
pub fn register_pool(base: usize, size: usize) -> Result<PoolHandle, PoolError> {
    if !size.is_power_of_two() {
        return Err(PoolError::NotPowerOfTwo(size));
    }
    if size < SUPER_PAGE_SIZE {
        return Err(PoolError::TooSmall(size));
    }
    if base == 0 || untag(base) != base || !is_aligned(base, size) {
        return Err(PoolError::Misaligned { base, size });
    }
    let pool = Pool {
        base,
        base_mask: !(size - 1),
    };

    let _guard = REGISTRY_LOCK.lock();
    let mut free = None;
    for (index, slot) in POOLS.iter().enumerate() {
        let other_base = slot.base.load(Ordering::Relaxed);
        if other_base == 0 {
            free.get_or_insert(index);
            continue;
        }
        let other = Pool {
            base: other_base,
            base_mask: slot.base_mask.load(Ordering::Relaxed),
        };
        // Both are size-aligned powers of two: they overlap iff one contains
        // the other's base.
        if other.contains(base) || pool.contains(other_base) {
            return Err(PoolError::Overlap(base));
        }
    }
    let index = free.ok_or(PoolError::Full)?;
    let slot = &POOLS[index];
    // Mask first: a reader that sees the base must see its mask.
    slot.base_mask.store(pool.base_mask, Ordering::Release);
    slot.base.store(base, Ordering::Release);
    log::debug!(
        "slotlist: registered pool {} at {:#x} ({:#x} bytes)",
        index,
        base,
        size
    );
    Ok(PoolHandle { index, pool })
}

/// Remove a pool from the registry.
///
/// # Safety
/// No freelist entry inside the pool may be encoded or decoded afterwards,
/// and no other thread may be looking the pool up concurrently.
pub unsafe fn unregister_pool(handle: PoolHandle) {
    let _guard = REGISTRY_LOCK.lock();
    let slot = &POOLS[handle.index];
    slot.base.store(0, Ordering::Release);
    slot.base_mask.store(0, Ordering::Release);
    log::debug!(
        "slotlist: unregistered pool {} at {:#x}",
        handle.index,
        handle.pool.base
    );
}
