//! Freelists: the encoded entry, the per-span list guarded by the bucket
//! lock, and the per-thread cache.

pub mod entry;
pub mod span;
pub mod thread_cache;

pub use entry::{DefaultFreelistEntry, FreelistEntry};
pub use span::SlotSpan;
pub use thread_cache::ThreadCacheBucket;
