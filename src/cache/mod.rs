//! Generic caching layer for whole-collection snapshots.
//!
//! This module knows nothing about photos. It provides:
//! - Typed keys that hash to stable storage keys and carry a TTL class
//! - Read-time staleness (no background sweep)
//! - Interchangeable storage backends (SQLite, in-memory, disabled)

mod layer;
mod storage;
mod traits;

pub use layer::{CacheStore, TtlPolicy};
pub use storage::{CacheStorage, MemoryStorage, NoopStorage, SqliteStorage, StoredEntry};
pub use traits::{CacheKey, CacheResult, CacheSource, TtlClass};
