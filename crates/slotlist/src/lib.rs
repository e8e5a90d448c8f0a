//! Encoded, corruption-checked freelists for a slab allocator's slot spans,
//! and the adaptive lock that guards them.
//!
//! The bucket layer that owns spans, slot sizes and memory mapping lives
//! outside this crate. It emplaces [`FreelistEntry`] nodes into free slots,
//! links and pops them under a [`sync::Lock`], and lets this crate decide
//! whether every link it reads back is still one it wrote.

extern crate libc;

pub mod config;
pub mod encoding;
pub mod freelist;
pub mod hardening;
pub mod platform;
pub mod sync;
pub mod transform;
pub mod util;

#[doc(hidden)]
pub mod __test_support;

pub use encoding::{DefaultEncoder, PointerEncoder, PoolOffset, WholePointer};
pub use freelist::{DefaultFreelistEntry, FreelistEntry, SlotSpan, ThreadCacheBucket};
pub use sync::{Lock, Mutex};
