//! Cache keys for catalog data.

use sha2::{Digest, Sha256};

use crate::cache::{CacheKey, TtlClass};

/// Query key types for catalog data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogKey {
  /// Every photo of one album or folder
  CollectionItems { resource_id: String },
  /// The album/folder listing
  Collections,
}

impl CatalogKey {
  pub fn items(resource_id: &str) -> Self {
    Self::CollectionItems {
      resource_id: resource_id.to_string(),
    }
  }
}

impl CacheKey for CatalogKey {
  fn cache_hash(&self) -> String {
    let input = match self {
      Self::CollectionItems { resource_id } => format!("collection_items:{}", resource_id),
      Self::Collections => "collections".to_string(),
    };

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  fn description(&self) -> String {
    match self {
      Self::CollectionItems { resource_id } => format!("photos in {}", resource_id),
      Self::Collections => "collections".to_string(),
    }
  }

  fn ttl_class(&self) -> TtlClass {
    match self {
      Self::CollectionItems { .. } => TtlClass::Collection,
      Self::Collections => TtlClass::Hierarchy,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_hash_is_stable_and_distinct() {
    let a = CatalogKey::items("album-1").cache_hash();
    assert_eq!(a, CatalogKey::items("album-1").cache_hash());
    assert_eq!(a.len(), 64);
    assert_ne!(a, CatalogKey::items("album-2").cache_hash());
    assert_ne!(a, CatalogKey::Collections.cache_hash());
  }

  #[test]
  fn test_ttl_classes() {
    assert_eq!(CatalogKey::items("x").ttl_class(), TtlClass::Collection);
    assert_eq!(CatalogKey::Collections.ttl_class(), TtlClass::Hierarchy);
  }
}
