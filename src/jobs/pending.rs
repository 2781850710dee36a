//! Per-photo processing state owned by the core.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::photos::PhotoId;

/// Where a photo stands in the annotation pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
  /// Handed to the service, not yet seen in flight
  Submitted,
  Processing,
  Processed,
  Failed { reason: String },
}

/// Map from photo id to its pending state.
#[derive(Debug, Clone, Default)]
pub struct PendingItems {
  inner: Arc<Mutex<HashMap<PhotoId, ItemStatus>>>,
}

impl PendingItems {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<PhotoId, ItemStatus>> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn mark<'a>(&self, ids: impl IntoIterator<Item = &'a PhotoId>, status: ItemStatus) {
    let mut items = self.lock();
    for id in ids {
      items.insert(id.clone(), status.clone());
    }
  }

  pub fn set(&self, id: &str, status: ItemStatus) {
    self.lock().insert(id.to_string(), status);
  }

  /// Drop the markers for `ids`.
  pub fn clear<'a>(&self, ids: impl IntoIterator<Item = &'a PhotoId>) {
    let mut items = self.lock();
    for id in ids {
      items.remove(id);
    }
  }

  /// Move every id still marked `Submitted` that the service reports as in
  /// flight to `Processing`.
  pub fn observe_in_flight<'a>(&self, ids: impl IntoIterator<Item = &'a PhotoId>) {
    let mut items = self.lock();
    for id in ids {
      if let Some(status) = items.get_mut(id) {
        if *status == ItemStatus::Submitted {
          *status = ItemStatus::Processing;
        }
      }
    }
  }

  pub fn status(&self, id: &str) -> Option<ItemStatus> {
    self.lock().get(id).cloned()
  }

  /// Ids still waiting on the service.
  pub fn outstanding(&self) -> Vec<PhotoId> {
    let mut ids: Vec<PhotoId> = self
      .lock()
      .iter()
      .filter(|(_, status)| matches!(status, ItemStatus::Submitted | ItemStatus::Processing))
      .map(|(id, _)| id.clone())
      .collect();
    ids.sort();
    ids
  }
}
