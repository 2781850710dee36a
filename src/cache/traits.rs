//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Resource class that decides how long an entry stays fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtlClass {
  /// Leaf collections (photo lists), short TTL
  Collection,
  /// Hierarchical listings (album/folder trees), longer TTL
  Hierarchy,
}

impl TtlClass {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Collection => "collection",
      Self::Hierarchy => "hierarchy",
    }
  }
}

impl fmt::Display for TtlClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for TtlClass {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "collection" => Ok(Self::Collection),
      "hierarchy" => Ok(Self::Hierarchy),
      other => Err(format!("unknown ttl class '{}'", other)),
    }
  }
}

/// Trait for typed cache keys.
///
/// Implementors map a logical query to a stable storage key and declare which
/// TTL class governs it.
pub trait CacheKey {
  /// Stable, fixed-length storage key
  fn cache_hash(&self) -> String;

  /// Human readable description, stored alongside the entry
  fn description(&self) -> String;

  /// TTL class for entries under this key
  fn ttl_class(&self) -> TtlClass;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      cached_at: Some(cached_at),
    }
  }

  /// Whether the caller should revalidate this data.
  pub fn is_stale(&self) -> bool {
    self.source == CacheSource::CacheStale
  }
}

/// Indicates where data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Data from cache past its TTL; a revalidation should follow
  CacheStale,
}
