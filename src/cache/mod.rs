//! Fast-tier caching: TTL policy, backend contract, fail-soft wrapper.

pub mod fast_store;
pub mod tiered;
pub mod ttl;

pub use fast_store::{FastStore, MemoryFastStore};
pub use tiered::{keys, TieredCache};
pub use ttl::{CacheHint, TtlPolicy};
