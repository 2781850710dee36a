//! Cancellation and resource-identity guarding for background work.
//!
//! Two checks protect shared state from work the user has walked away from:
//! the session's [`CancellationToken`] and a comparison between the resource
//! the work was started for and the resource that is active now. Writes from
//! background tasks go through [`SessionGuard::commit`], which performs the
//! identity check and the write under one lock so nothing can switch the
//! active resource in between.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{CatalogError, Result};
use crate::photos::types::ResourceId;

/// Marker for the resource currently shown on the display surface.
#[derive(Debug, Clone, Default)]
pub struct ActiveResource {
  current: Arc<Mutex<Option<ResourceId>>>,
}

impl ActiveResource {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Option<ResourceId>> {
    self.current.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Make `resource_id` the active resource.
  pub fn activate(&self, resource_id: &str) {
    *self.lock() = Some(resource_id.to_string());
  }

  /// Clear the marker; every in-flight background write becomes stale.
  pub fn deactivate(&self) {
    *self.lock() = None;
  }

  pub fn current(&self) -> Option<ResourceId> {
    self.lock().clone()
  }

  pub fn is_active(&self, resource_id: &str) -> bool {
    self.lock().as_deref() == Some(resource_id)
  }

  /// Run `write` only while `resource_id` is still active.
  pub fn write_if_active<R>(&self, resource_id: &str, write: impl FnOnce() -> R) -> Result<R> {
    let current = self.lock();
    if current.as_deref() == Some(resource_id) {
      Ok(write())
    } else {
      debug!(resource = resource_id, active = ?*current, "discarding stale write");
      Err(CatalogError::stale(resource_id))
    }
  }
}

/// Token plus resource identity for one unit of background work.
#[derive(Debug, Clone)]
pub struct SessionGuard {
  resource_id: ResourceId,
  token: CancellationToken,
  active: ActiveResource,
}

impl SessionGuard {
  pub fn new(resource_id: &str, token: CancellationToken, active: ActiveResource) -> Self {
    Self {
      resource_id: resource_id.to_string(),
      token,
      active,
    }
  }

  pub fn resource_id(&self) -> &str {
    &self.resource_id
  }

  pub fn token(&self) -> &CancellationToken {
    &self.token
  }

  /// Ok while the session may keep going.
  ///
  /// Revocation is reported as [`CatalogError::Cancelled`], a resource switch
  /// as [`CatalogError::StaleContext`]. Both are silent outcomes.
  pub fn check(&self) -> Result<()> {
    if self.token.is_cancelled() {
      return Err(CatalogError::Cancelled);
    }
    if !self.active.is_active(&self.resource_id) {
      return Err(CatalogError::stale(&self.resource_id));
    }
    Ok(())
  }

  /// Apply `write` if the session is still live and its resource still active.
  pub fn commit<R>(&self, write: impl FnOnce() -> R) -> Result<R> {
    if self.token.is_cancelled() {
      return Err(CatalogError::Cancelled);
    }
    self.active.write_if_active(&self.resource_id, write)
  }
}

/// Holds the one live session of a display surface.
///
/// Beginning a session revokes the previous session's token first.
#[derive(Debug, Clone, Default)]
pub struct SessionSlot {
  current: Arc<Mutex<Option<(ResourceId, CancellationToken)>>>,
}

impl SessionSlot {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Option<(ResourceId, CancellationToken)>> {
    self.current.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Revoke the live session (if any) and start a new one for `resource_id`.
  pub fn begin(&self, resource_id: &str) -> CancellationToken {
    let token = CancellationToken::new();
    let previous = self
      .lock()
      .replace((resource_id.to_string(), token.clone()));
    if let Some((previous_id, previous_token)) = previous {
      debug!(previous = %previous_id, next = resource_id, "revoking previous session");
      previous_token.cancel();
    }
    token
  }

  /// Revoke the live session if it belongs to `resource_id`.
  pub fn cancel(&self, resource_id: &str) -> bool {
    let mut current = self.lock();
    match current.as_ref() {
      Some((id, token)) if id == resource_id => {
        token.cancel();
        *current = None;
        true
      }
      _ => false,
    }
  }

  /// Revoke whatever session is live.
  pub fn cancel_current(&self) {
    if let Some((_, token)) = self.lock().take() {
      token.cancel();
    }
  }
}
