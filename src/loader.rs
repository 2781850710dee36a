//! Incremental loading of large collections.
//!
//! The first page is awaited by the caller so something can be shown at once;
//! the rest is fetched by a background task that stops silently when its
//! session is revoked or the user moves to another resource.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheSource, CacheStore};
use crate::error::{CatalogError, Result};
use crate::event::{Events, LoadEvent};
use crate::photos::{CatalogKey, Page, Photo, PhotoApi, ResourceId};
use crate::session::{ActiveResource, SessionGuard, SessionSlot};

/// Progress of one paginated fetch.
///
/// Before the first page arrives `has_more` is true and `total_count` is 0.
/// After that `cursor <= total_count` holds and `has_more` follows the server.
#[derive(Debug, Clone)]
pub struct LoadSession {
  pub resource_id: ResourceId,
  pub page_size: u64,
  /// Items fetched so far, also the offset of the next request
  pub cursor: u64,
  pub total_count: u64,
  pub has_more: bool,
  pub items: Vec<Photo>,
}

impl LoadSession {
  pub fn new(resource_id: &str, page_size: u64) -> Self {
    Self {
      resource_id: resource_id.to_string(),
      page_size,
      cursor: 0,
      total_count: 0,
      has_more: true,
      items: Vec::new(),
    }
  }

  /// Append `page`, returning its items.
  pub fn append(&mut self, page: Page) -> Vec<Photo> {
    let received = page.items.len() as u64;
    if page.has_more && received == 0 {
      warn!(
        resource = %self.resource_id,
        cursor = self.cursor,
        "server reported more items but returned none, stopping"
      );
    }

    self.cursor += received;
    // The server's flag wins over a locally recomputed count
    self.total_count = page.total_count.max(self.cursor);
    self.has_more = page.has_more && received > 0;
    self.items.extend(page.items.iter().cloned());
    page.items
  }

  pub fn percent(&self) -> f64 {
    if self.total_count == 0 {
      100.0
    } else {
      self.cursor as f64 * 100.0 / self.total_count as f64
    }
  }
}

/// What a run does with the pages it fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
  /// Emit every page as it arrives
  Display,
  /// Fetch quietly, then replace the displayed collection in one step
  Revalidate,
}

/// The page the caller awaited, plus the task fetching the rest.
#[derive(Debug)]
pub struct FirstPage {
  pub items: Vec<Photo>,
  pub total_count: u64,
  pub has_more: bool,
  pub source: CacheSource,
  /// Resolves to the number of items loaded; `None` when nothing is left to fetch
  pub background: Option<JoinHandle<Result<u64>>>,
}

#[derive(Clone)]
pub struct PaginatedLoader {
  api: Arc<dyn PhotoApi>,
  cache: CacheStore,
  active: ActiveResource,
  sessions: SessionSlot,
  events: Events,
  page_delay: Duration,
}

impl PaginatedLoader {
  pub fn new(
    api: Arc<dyn PhotoApi>,
    cache: CacheStore,
    active: ActiveResource,
    events: Events,
    page_delay: Duration,
  ) -> Self {
    Self {
      api,
      cache,
      active,
      sessions: SessionSlot::new(),
      events,
      page_delay,
    }
  }

  /// Fetch page 0 of `resource_id`, then keep loading in the background.
  ///
  /// Any session already running on this loader is revoked first.
  pub async fn load_first(&self, resource_id: &str, page_size: u64) -> Result<FirstPage> {
    if page_size == 0 {
      let error = CatalogError::Validation("page size must be at least 1".to_string());
      self.events.error(&error);
      return Err(error);
    }

    let guard = SessionGuard::new(
      resource_id,
      self.sessions.begin(resource_id),
      self.active.clone(),
    );
    let mut session = LoadSession::new(resource_id, page_size);

    let page = self
      .fetch(&guard, &session)
      .await
      .map_err(|e| self.surface(&guard, e))?;
    let items = session.append(page);

    guard
      .commit(|| {
        self.events.load(LoadEvent::PageLoaded {
          resource_id: session.resource_id.clone(),
          items: items.clone(),
          total_count: session.total_count,
          has_more: session.has_more,
          source: CacheSource::Network,
        });
        self.emit_progress(&session);
      })
      .map_err(|e| self.surface(&guard, e))?;

    let total_count = session.total_count;
    let has_more = session.has_more;
    let background = if has_more {
      let this = self.clone();
      Some(tokio::spawn(async move {
        this.drive(guard, session, LoadMode::Display).await
      }))
    } else {
      self.finish(&guard, session, LoadMode::Display)?;
      None
    };

    Ok(FirstPage {
      items,
      total_count,
      has_more,
      source: CacheSource::Network,
      background,
    })
  }

  /// Re-fetch all of `resource_id` in the background and replace the
  /// displayed collection and the cache entry once complete.
  pub fn revalidate(&self, resource_id: &str, page_size: u64) -> JoinHandle<Result<u64>> {
    let guard = SessionGuard::new(
      resource_id,
      self.sessions.begin(resource_id),
      self.active.clone(),
    );
    let session = LoadSession::new(resource_id, page_size.max(1));
    let this = self.clone();
    tokio::spawn(async move { this.drive(guard, session, LoadMode::Revalidate).await })
  }

  /// Revoke the session loading `resource_id`, if it is the live one.
  pub fn cancel(&self, resource_id: &str) -> bool {
    self.sessions.cancel(resource_id)
  }

  /// Revoke whatever session is live.
  pub fn cancel_current(&self) {
    self.sessions.cancel_current();
  }

  async fn drive(self, guard: SessionGuard, mut session: LoadSession, mode: LoadMode) -> Result<u64> {
    while session.has_more {
      guard.check().map_err(|e| self.surface(&guard, e))?;

      // Bound the request rate; the first request of a revalidation goes out at once
      if session.cursor > 0 {
        tokio::select! {
          _ = guard.token().cancelled() => return Err(self.surface(&guard, CatalogError::Cancelled)),
          _ = tokio::time::sleep(self.page_delay) => {}
        }
      }

      let page = self
        .fetch(&guard, &session)
        .await
        .map_err(|e| self.surface(&guard, e))?;
      let items = session.append(page);
      debug!(
        resource = %session.resource_id,
        cursor = session.cursor,
        total = session.total_count,
        "page received"
      );

      if mode == LoadMode::Display {
        guard
          .commit(|| {
            self.events.load(LoadEvent::PageAppended {
              resource_id: session.resource_id.clone(),
              items,
              cursor: session.cursor,
              has_more: session.has_more,
            });
            self.emit_progress(&session);
          })
          .map_err(|e| self.surface(&guard, e))?;
      }
    }

    self.finish(&guard, session, mode)
  }

  /// Issue the next page request unless the session is already over.
  async fn fetch(&self, guard: &SessionGuard, session: &LoadSession) -> Result<Page> {
    guard.check()?;
    tokio::select! {
      biased;
      _ = guard.token().cancelled() => Err(CatalogError::Cancelled),
      page = self.api.fetch_page(&session.resource_id, session.cursor, session.page_size) => page,
    }
  }

  /// Store the complete collection and tell the presentation layer.
  fn finish(&self, guard: &SessionGuard, session: LoadSession, mode: LoadMode) -> Result<u64> {
    let key = CatalogKey::items(&session.resource_id);
    let loaded = session.cursor;

    let stored = guard
      .commit(|| {
        let stored = self.cache.set(&key, &session.items);
        let event = match mode {
          LoadMode::Display => LoadEvent::Finished {
            resource_id: session.resource_id.clone(),
            loaded,
          },
          LoadMode::Revalidate => LoadEvent::Refreshed {
            resource_id: session.resource_id.clone(),
            items: session.items.clone(),
          },
        };
        self.events.load(event);
        stored
      })
      .map_err(|e| self.surface(guard, e))?;

    // The load itself succeeded; a cache failure only costs the next open
    if let Err(e) = stored {
      self.events.error(&e);
    }

    info!(resource = %session.resource_id, loaded, ?mode, "collection loaded");
    Ok(loaded)
  }

  fn emit_progress(&self, session: &LoadSession) {
    self.events.load(LoadEvent::Progress {
      resource_id: session.resource_id.clone(),
      loaded: session.cursor,
      total: session.total_count,
      percent: session.percent(),
    });
  }

  /// Surface `error` once, unless the session was abandoned meanwhile; in that
  /// case the failure belongs to a resource nobody is looking at.
  fn surface(&self, guard: &SessionGuard, error: CatalogError) -> CatalogError {
    if !error.is_silent() {
      if let Err(abandoned) = guard.check() {
        debug!(%error, "dropping failure of abandoned session");
        return abandoned;
      }
    }
    self.events.error(&error);
    error
  }
}
