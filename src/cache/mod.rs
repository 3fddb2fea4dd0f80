//! Named, versioned cache stores and the policy around them.
//!
//! This module provides:
//! - Pluggable storage backends (SQLite for real use, in-memory for tests)
//! - The store manager enforcing the single-current-store-per-role invariant
//! - The cacheability verdict applied before any dynamic write

mod backend;
mod manager;
mod verdict;

pub use backend::{CacheEntry, MemoryBackend, QuotaExceeded, SqliteBackend, StoreBackend};
pub use manager::{CacheStoreManager, StoreRole};
pub use verdict::{cacheable, entry_key, MAX_CACHEABLE_BYTES};
