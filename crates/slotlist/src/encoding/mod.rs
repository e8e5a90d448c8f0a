//! Pointer encoders for freelist links.
//!
//! An encoder turns the address of the next free slot into the opaque word
//! stored in the current slot, and back. Two strategies exist:
//!
//! - [`WholePointer`] transforms the full address. Portable, stateless.
//! - [`PoolOffset`] keeps only the offset inside the owning pool (plus any
//!   hardware tag) and re-attaches the pool base on decode, so a forged
//!   link can never point outside the pool the entry lives in.
//!
//! The choice is static: `FreelistEntry` is generic over the encoder and
//! [`DefaultEncoder`] picks one per target.

mod pool;
mod whole;

pub use pool::{
    pool_of, register_pool, unregister_pool, Pool, PoolError, PoolHandle, PoolLookup,
    PoolOffset, RegisteredPools,
};
pub use whole::WholePointer;

/// Encode/decode strategy for a freelist link.
///
/// All addresses are raw `usize` values, possibly carrying a hardware tag.
pub trait PointerEncoder {
    /// The stored word that means "no next entry".
    const NULL: usize;

    /// Encode the address of the next entry. `next` is never 0.
    fn encode(next: usize) -> usize;

    /// Decode a stored word read from the entry at `here`.
    /// `encoded` is never 0 nor `NULL`.
    fn decode(here: usize, encoded: usize) -> usize;

    /// Whether `next` still belongs to the same pool as `here`.
    /// Encoders not bound to a pool always say yes.
    fn is_same_pool(here: usize, next: usize) -> bool;
}

cfg_if::cfg_if! {
    if #[cfg(all(feature = "pool-offset", target_pointer_width = "64"))] {
        /// Encoder used by [`crate::freelist::DefaultFreelistEntry`].
        pub type DefaultEncoder = PoolOffset<RegisteredPools>;
    } else {
        /// Encoder used by [`crate::freelist::DefaultFreelistEntry`].
        pub type DefaultEncoder = WholePointer;
    }
}
