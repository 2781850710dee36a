//! The catalog service: one instance of every core component, wired together.
//!
//! Opening a collection consults the cache first. A hit is shown at once and,
//! when stale, revalidated in the background; a miss goes through the
//! paginated loader, which fills the cache when it completes. Batch jobs are
//! handed from the submitter to the status poller, and a finished batch
//! triggers one revalidation of whatever is displayed.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{CacheResult, CacheStore};
use crate::error::{CatalogError, Result};
use crate::event::{Events, JobEvent, LoadEvent};
use crate::jobs::{JobSubmitter, PendingItems, Revalidate, StatusPoller};
use crate::loader::{FirstPage, PaginatedLoader};
use crate::photos::{
  CatalogKey, Collection, Photo, PhotoApi, PhotoId, ProcessingJob, ProcessingSnapshot,
  ProviderConfig, ResourceId, SingleOutcome,
};
use crate::session::ActiveResource;

#[derive(Debug, Clone, Copy)]
pub struct CatalogSettings {
  pub page_size: u64,
  /// Pause between background page requests
  pub page_delay: Duration,
  pub poll_interval: Duration,
}

impl Default for CatalogSettings {
  fn default() -> Self {
    Self {
      page_size: 30,
      page_delay: Duration::from_millis(150),
      poll_interval: Duration::from_secs(2),
    }
  }
}

/// Refreshes the displayed resource once a batch finishes.
struct ActiveRevalidator {
  loader: PaginatedLoader,
  active: ActiveResource,
  page_size: u64,
}

impl Revalidate for ActiveRevalidator {
  fn revalidate_active(&self) -> Option<JoinHandle<Result<u64>>> {
    match self.active.current() {
      Some(resource_id) => {
        debug!(resource = %resource_id, "revalidating after batch");
        Some(self.loader.revalidate(&resource_id, self.page_size))
      }
      None => {
        debug!("nothing displayed, skipping revalidation");
        None
      }
    }
  }
}

/// The collection hierarchy, plus the refresh running behind a stale listing.
#[derive(Debug)]
pub struct CollectionListing {
  pub listing: CacheResult<Vec<Collection>>,
  /// Updates the cached listing; `None` unless the listing was stale
  pub background: Option<JoinHandle<Result<()>>>,
}

pub struct Catalog {
  api: Arc<dyn PhotoApi>,
  cache: CacheStore,
  active: ActiveResource,
  loader: PaginatedLoader,
  submitter: JobSubmitter,
  poller: StatusPoller,
  pending: PendingItems,
  events: Events,
  settings: CatalogSettings,
}

impl Catalog {
  pub fn new(
    api: Arc<dyn PhotoApi>,
    cache: CacheStore,
    settings: CatalogSettings,
    events: Events,
  ) -> Self {
    let active = ActiveResource::new();
    let pending = PendingItems::new();
    let loader = PaginatedLoader::new(
      api.clone(),
      cache.clone(),
      active.clone(),
      events.clone(),
      settings.page_delay,
    );
    let revalidator = Arc::new(ActiveRevalidator {
      loader: loader.clone(),
      active: active.clone(),
      page_size: settings.page_size,
    });
    let submitter = JobSubmitter::new(api.clone(), pending.clone(), events.clone());
    let poller = StatusPoller::new(
      api.clone(),
      pending.clone(),
      events.clone(),
      revalidator,
      settings.poll_interval,
    );

    Self {
      api,
      cache,
      active,
      loader,
      submitter,
      poller,
      pending,
      events,
      settings,
    }
  }

  pub fn settings(&self) -> CatalogSettings {
    self.settings
  }

  pub fn pending(&self) -> &PendingItems {
    &self.pending
  }

  /// Sender for reporting failures that happen outside the core.
  pub fn events(&self) -> &Events {
    &self.events
  }

  pub fn poller(&self) -> &StatusPoller {
    &self.poller
  }

  pub fn active_resource(&self) -> Option<ResourceId> {
    self.active.current()
  }

  /// Show `resource_id`, from the cache when possible.
  ///
  /// Whatever was loading before is revoked. A cache hit is returned with
  /// `has_more == false`; when stale, `background` is the revalidation run.
  pub async fn open_collection(&self, resource_id: &str) -> Result<FirstPage> {
    let resource_id = resource_id.trim();
    if resource_id.is_empty() {
      return Err(self.reject("no collection selected"));
    }

    self.loader.cancel_current();
    self.active.activate(resource_id);

    match self.cache.get::<Vec<Photo>, _>(&CatalogKey::items(resource_id)) {
      Ok(Some(hit)) => return Ok(self.show_cached(resource_id, hit)),
      Ok(None) => debug!(resource = resource_id, "cache miss"),
      // An unreadable cache only costs a network load
      Err(error) => self.events.error(&error),
    }

    self
      .loader
      .load_first(resource_id, self.settings.page_size)
      .await
  }

  fn show_cached(&self, resource_id: &str, hit: CacheResult<Vec<Photo>>) -> FirstPage {
    let total_count = hit.data.len() as u64;
    info!(
      resource = resource_id,
      items = total_count,
      stale = hit.is_stale(),
      "showing cached collection"
    );
    self.events.load(LoadEvent::PageLoaded {
      resource_id: resource_id.to_string(),
      items: hit.data.clone(),
      total_count,
      has_more: false,
      source: hit.source,
    });

    let background = hit
      .is_stale()
      .then(|| self.loader.revalidate(resource_id, self.settings.page_size));

    FirstPage {
      items: hit.data,
      total_count,
      has_more: false,
      source: hit.source,
      background,
    }
  }

  /// Stop loading and clear the display marker.
  pub fn close(&self) {
    self.loader.cancel_current();
    self.active.deactivate();
  }

  /// The collection hierarchy, stale-while-revalidate.
  ///
  /// A stale listing is returned at once; await `background` to make sure
  /// the refreshed listing reaches the cache.
  pub async fn collections(&self) -> Result<CollectionListing> {
    let key = CatalogKey::Collections;
    match self.cache.get::<Vec<Collection>, _>(&key) {
      Ok(Some(hit)) => {
        let background = hit.is_stale().then(|| self.refresh_collections());
        return Ok(CollectionListing {
          listing: hit,
          background,
        });
      }
      Ok(None) => {}
      Err(error) => self.events.error(&error),
    }

    let listing = self.api.collections().await.map_err(|e| self.fail(e))?;
    if let Err(error) = self.cache.set(&key, &listing) {
      self.events.error(&error);
    }
    Ok(CollectionListing {
      listing: CacheResult::from_network(listing),
      background: None,
    })
  }

  fn refresh_collections(&self) -> JoinHandle<Result<()>> {
    let api = self.api.clone();
    let cache = self.cache.clone();
    let events = self.events.clone();
    tokio::spawn(async move {
      let stored = match api.collections().await {
        Ok(listing) => cache.set(&CatalogKey::Collections, &listing),
        Err(error) => Err(error),
      };
      match &stored {
        Ok(()) => debug!("collections refreshed"),
        Err(error) => events.error(error),
      }
      stored
    })
  }

  /// Submit a batch and start tracking it.
  pub async fn submit_batch(
    &self,
    photo_ids: &[PhotoId],
    provider: &ProviderConfig,
  ) -> Result<ProcessingJob> {
    let job = self.submitter.submit_batch(photo_ids, provider).await?;
    self.poller.start(&job);
    Ok(job)
  }

  pub async fn submit_single(
    &self,
    photo_id: &str,
    provider: &ProviderConfig,
  ) -> Result<SingleOutcome> {
    self.submitter.submit_single(photo_id, provider).await
  }

  /// One poll of the service, outside of any batch.
  pub async fn batch_status(&self) -> Result<ProcessingSnapshot> {
    self.api.batch_status().await.map_err(|e| self.fail(e))
  }

  /// Ask the service to reconcile stored statuses with finished work.
  pub async fn confirm_processing_status(&self) -> Result<u64> {
    let photos_updated = self
      .api
      .confirm_processing_status()
      .await
      .map_err(|e| self.fail(e))?;
    self.events.job(JobEvent::Reconciled { photos_updated });
    Ok(photos_updated)
  }

  /// Drop one collection's cache entry, or everything.
  pub fn clear_cache(&self, resource_id: Option<&str>) -> Result<()> {
    let cleared = match resource_id {
      Some(id) => self.cache.clear(&CatalogKey::items(id)),
      None => self.cache.clear_all(),
    };
    cleared.map_err(|e| self.fail(e))
  }

  fn reject(&self, reason: &str) -> CatalogError {
    self.fail(CatalogError::Validation(reason.to_string()))
  }

  fn fail(&self, error: CatalogError) -> CatalogError {
    self.events.error(&error);
    error
  }
}
