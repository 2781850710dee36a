//! TTL-aware cache store with a stale-while-revalidate read path.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::storage::CacheStorage;
use super::traits::{CacheKey, CacheResult, TtlClass};
use crate::error::Result;

/// How long entries of each class stay fresh.
#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
  pub collection: Duration,
  pub hierarchy: Duration,
}

impl Default for TtlPolicy {
  fn default() -> Self {
    Self {
      collection: Duration::minutes(5),
      hierarchy: Duration::minutes(30),
    }
  }
}

impl TtlPolicy {
  pub fn ttl(&self, class: TtlClass) -> Duration {
    match class {
      TtlClass::Collection => self.collection,
      TtlClass::Hierarchy => self.hierarchy,
    }
  }
}

/// Key/value store with per-class TTL.
///
/// `get` hands back stored data whether or not it has outlived its TTL; the
/// returned [`CacheResult`] says which, so callers can show stale data at
/// once and refresh it in the background. There is no background sweep:
/// staleness is decided at read time.
pub struct CacheStore {
  storage: Arc<dyn CacheStorage>,
  ttls: TtlPolicy,
}

impl CacheStore {
  /// Create a new cache store with the given storage backend.
  pub fn new(storage: impl CacheStorage + 'static) -> Self {
    Self {
      storage: Arc::new(storage),
      ttls: TtlPolicy::default(),
    }
  }

  /// Create a cache store over a backend chosen at runtime.
  pub fn shared(storage: Arc<dyn CacheStorage>) -> Self {
    Self {
      storage,
      ttls: TtlPolicy::default(),
    }
  }

  /// Replace the TTL policy.
  pub fn with_ttls(mut self, ttls: TtlPolicy) -> Self {
    self.ttls = ttls;
    self
  }

  /// Override the TTL of a single class.
  pub fn with_ttl(mut self, class: TtlClass, ttl: Duration) -> Self {
    match class {
      TtlClass::Collection => self.ttls.collection = ttl,
      TtlClass::Hierarchy => self.ttls.hierarchy = ttl,
    }
    self
  }

  pub fn ttls(&self) -> TtlPolicy {
    self.ttls
  }

  /// An entry is valid iff `now - written_at < ttl`.
  fn is_stale(&self, written_at: DateTime<Utc>, class: TtlClass) -> bool {
    Utc::now() - written_at >= self.ttls.ttl(class)
  }

  /// Look up `key`, returning the payload with its freshness.
  pub fn get<T, K>(&self, key: &K) -> Result<Option<CacheResult<T>>>
  where
    T: DeserializeOwned,
    K: CacheKey,
  {
    let Some(entry) = self.storage.read(&key.cache_hash())? else {
      return Ok(None);
    };

    let data: T = serde_json::from_slice(&entry.payload)?;
    let stale = self.is_stale(entry.written_at, key.ttl_class());
    debug!(key = %key.description(), stale, "cache hit");

    Ok(Some(CacheResult::from_cache(data, entry.written_at, stale)))
  }

  /// Store `payload` under `key`, overwriting any previous snapshot.
  pub fn set<T, K>(&self, key: &K, payload: &T) -> Result<()>
  where
    T: Serialize + ?Sized,
    K: CacheKey,
  {
    let bytes = serde_json::to_vec(payload)?;
    self
      .storage
      .write(&key.cache_hash(), &key.description(), key.ttl_class(), &bytes)
  }

  /// Drop the entry under `key`.
  pub fn clear<K: CacheKey>(&self, key: &K) -> Result<()> {
    self.storage.remove(&key.cache_hash())
  }

  /// Drop every entry.
  pub fn clear_all(&self) -> Result<()> {
    self.storage.clear()
  }
}

impl Clone for CacheStore {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      ttls: self.ttls,
    }
  }
}
