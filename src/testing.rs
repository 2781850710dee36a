//! In-memory [`PhotoApi`] double for unit tests.

use futures::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{CatalogError, Result};
use crate::photos::{
  Collection, Page, Photo, PhotoApi, PhotoId, ProcessingSnapshot, ProviderConfig, SingleOutcome,
};

/// A request as the double saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
  Page {
    resource_id: String,
    skip: u64,
    limit: u64,
  },
  Batch {
    photo_ids: Vec<PhotoId>,
    provider_id: String,
    credential: Option<String>,
  },
  Single {
    photo_id: String,
    provider_id: String,
  },
  Status,
  Confirm,
  Collections,
}

/// Serves collections by slicing in-memory lists and replays scripted
/// status snapshots in order.
#[derive(Default)]
pub struct ScriptedApi {
  items: Mutex<HashMap<String, Vec<Photo>>>,
  page_overrides: Mutex<HashMap<(String, u64), Page>>,
  failing_pages: Mutex<HashMap<String, u64>>,
  statuses: Mutex<VecDeque<Result<ProcessingSnapshot>>>,
  batch_error: Mutex<Option<CatalogError>>,
  singles: Mutex<HashMap<String, Result<SingleOutcome>>>,
  listing: Mutex<Vec<Collection>>,
  photos_updated: Mutex<u64>,
  latency: Mutex<Duration>,
  requests: Mutex<Vec<Request>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
  m.lock().unwrap()
}

/// `n` photos with ids `{prefix}-0`, `{prefix}-1`, ...
pub fn photos(prefix: &str, n: usize) -> Vec<Photo> {
  (0..n).map(|i| Photo::new(format!("{}-{}", prefix, i))).collect()
}

impl ScriptedApi {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_collection(self, resource_id: &str, photos: Vec<Photo>) -> Self {
    self.replace_collection(resource_id, photos);
    self
  }

  pub fn replace_collection(&self, resource_id: &str, photos: Vec<Photo>) {
    lock(&self.items).insert(resource_id.to_string(), photos);
  }

  /// Serve `page` verbatim for the request at `skip`.
  pub fn with_page(self, resource_id: &str, skip: u64, page: Page) -> Self {
    lock(&self.page_overrides).insert((resource_id.to_string(), skip), page);
    self
  }

  /// Fail the page request at `skip` with a network error.
  pub fn failing_at(self, resource_id: &str, skip: u64) -> Self {
    lock(&self.failing_pages).insert(resource_id.to_string(), skip);
    self
  }

  pub fn with_statuses(self, statuses: Vec<Result<ProcessingSnapshot>>) -> Self {
    lock(&self.statuses).extend(statuses);
    self
  }

  pub fn with_batch_error(self, error: CatalogError) -> Self {
    *lock(&self.batch_error) = Some(error);
    self
  }

  pub fn with_single(self, photo_id: &str, outcome: Result<SingleOutcome>) -> Self {
    lock(&self.singles).insert(photo_id.to_string(), outcome);
    self
  }

  pub fn with_listing(self, listing: Vec<Collection>) -> Self {
    self.replace_listing(listing);
    self
  }

  pub fn replace_listing(&self, listing: Vec<Collection>) {
    *lock(&self.listing) = listing;
  }

  pub fn with_photos_updated(self, count: u64) -> Self {
    *lock(&self.photos_updated) = count;
    self
  }

  /// Delay every page response by `latency`.
  pub fn with_latency(self, latency: Duration) -> Self {
    *lock(&self.latency) = latency;
    self
  }

  pub fn requests(&self) -> Vec<Request> {
    lock(&self.requests).clone()
  }

  /// Offsets of every page request made for `resource_id`, in order.
  pub fn page_offsets(&self, resource_id: &str) -> Vec<u64> {
    self
      .requests()
      .into_iter()
      .filter_map(|r| match r {
        Request::Page {
          resource_id: id,
          skip,
          ..
        } if id == resource_id => Some(skip),
        _ => None,
      })
      .collect()
  }

  pub fn count(&self, wanted: &Request) -> usize {
    self.requests().iter().filter(|r| *r == wanted).count()
  }

  fn record(&self, request: Request) {
    lock(&self.requests).push(request);
  }

  fn page(&self, resource_id: &str, skip: u64, limit: u64) -> Result<Page> {
    if lock(&self.failing_pages).get(resource_id) == Some(&skip) {
      return Err(CatalogError::Network(format!(
        "page at {} of {} failed",
        skip, resource_id
      )));
    }
    if let Some(page) = lock(&self.page_overrides).get(&(resource_id.to_string(), skip)) {
      return Ok(page.clone());
    }

    let items = lock(&self.items);
    let all = items
      .get(resource_id)
      .ok_or_else(|| CatalogError::Network(format!("404 for {}", resource_id)))?;
    let start = (skip as usize).min(all.len());
    let end = (start + limit as usize).min(all.len());
    Ok(Page {
      items: all[start..end].to_vec(),
      total_count: all.len() as u64,
      has_more: end < all.len(),
    })
  }
}

impl PhotoApi for ScriptedApi {
  fn fetch_page(&self, resource_id: &str, skip: u64, limit: u64) -> BoxFuture<'_, Result<Page>> {
    let resource_id = resource_id.to_string();
    Box::pin(async move {
      self.record(Request::Page {
        resource_id: resource_id.clone(),
        skip,
        limit,
      });
      let latency = *lock(&self.latency);
      if !latency.is_zero() {
        tokio::time::sleep(latency).await;
      }
      self.page(&resource_id, skip, limit)
    })
  }

  fn submit_batch(
    &self,
    photo_ids: &[PhotoId],
    provider: &ProviderConfig,
  ) -> BoxFuture<'_, Result<String>> {
    let request = Request::Batch {
      photo_ids: photo_ids.to_vec(),
      provider_id: provider.provider_id.clone(),
      credential: provider.credential_override.clone(),
    };
    Box::pin(async move {
      self.record(request);
      match lock(&self.batch_error).clone() {
        Some(error) => Err(error),
        None => Ok("Batch processing started".to_string()),
      }
    })
  }

  fn submit_single(
    &self,
    photo_id: &str,
    provider: &ProviderConfig,
  ) -> BoxFuture<'_, Result<SingleOutcome>> {
    let photo_id = photo_id.to_string();
    let provider_id = provider.provider_id.clone();
    Box::pin(async move {
      self.record(Request::Single {
        photo_id: photo_id.clone(),
        provider_id,
      });
      lock(&self.singles)
        .get(&photo_id)
        .cloned()
        .unwrap_or_else(|| Err(CatalogError::Network("unscripted photo".into())))
    })
  }

  fn batch_status(&self) -> BoxFuture<'_, Result<ProcessingSnapshot>> {
    Box::pin(async move {
      self.record(Request::Status);
      // Once the script runs out the service reports itself idle
      lock(&self.statuses)
        .pop_front()
        .unwrap_or_else(|| Ok(ProcessingSnapshot::default()))
    })
  }

  fn confirm_processing_status(&self) -> BoxFuture<'_, Result<u64>> {
    Box::pin(async move {
      self.record(Request::Confirm);
      Ok(*lock(&self.photos_updated))
    })
  }

  fn collections(&self) -> BoxFuture<'_, Result<Vec<Collection>>> {
    Box::pin(async move {
      self.record(Request::Collections);
      Ok(lock(&self.listing).clone())
    })
  }
}
