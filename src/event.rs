//! Typed events emitted by the catalog core.
//!
//! The presentation layer reads these from an [`EventHandler`]; each family
//! has its own enum so payload shapes are checked at compile time.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::CacheSource;
use crate::error::{CatalogError, ErrorKind};
use crate::jobs::ItemStatus;
use crate::photos::{Photo, PhotoId, ResourceId};

/// Application events
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
  Load(LoadEvent),
  Job(JobEvent),
  Error(ErrorEvent),
}

/// Collection loading progress
#[derive(Debug, Clone, PartialEq)]
pub enum LoadEvent {
  /// First page shown (from the network or from the cache)
  PageLoaded {
    resource_id: ResourceId,
    items: Vec<Photo>,
    total_count: u64,
    has_more: bool,
    source: CacheSource,
  },
  /// A background page was appended
  PageAppended {
    resource_id: ResourceId,
    items: Vec<Photo>,
    cursor: u64,
    has_more: bool,
  },
  Progress {
    resource_id: ResourceId,
    loaded: u64,
    total: u64,
    percent: f64,
  },
  /// A revalidation replaced the displayed collection
  Refreshed {
    resource_id: ResourceId,
    items: Vec<Photo>,
  },
  /// Every page of the collection has been loaded
  Finished { resource_id: ResourceId, loaded: u64 },
}

/// Annotation job progress
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
  /// The service accepted a batch
  Submitted { count: u64, message: String },
  ItemStatus { photo_id: PhotoId, status: ItemStatus },
  Progress {
    completed: u64,
    expected: u64,
    fraction: f64,
  },
  /// No work is left in flight
  BatchComplete { count: u64 },
  Reconciled { photos_updated: u64 },
}

/// An error the user should see
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
  pub kind: ErrorKind,
  pub message: String,
}

/// Sending half shared by every component.
#[derive(Debug, Clone)]
pub struct Events {
  tx: mpsc::UnboundedSender<Event>,
}

impl Events {
  /// Create a connected sender/handler pair.
  pub fn channel() -> (Self, EventHandler) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, EventHandler { rx })
  }

  fn send(&self, event: Event) {
    // Nobody listening is not an error for the core
    let _ = self.tx.send(event);
  }

  pub fn load(&self, event: LoadEvent) {
    self.send(Event::Load(event));
  }

  pub fn job(&self, event: JobEvent) {
    self.send(Event::Job(event));
  }

  /// Surface `error` to the user, unless it is a silent outcome.
  pub fn error(&self, error: &CatalogError) {
    match error.kind() {
      Some(kind) => {
        warn!(%error, "surfacing error");
        self.send(Event::Error(ErrorEvent {
          kind,
          message: error.to_string(),
        }));
      }
      None => debug!(%error, "absorbed silent outcome"),
    }
  }
}

/// Receiving half read by the presentation layer.
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Receive the next event; `None` once every sender is gone.
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }

  /// Everything already queued, without waiting.
  pub fn drain(&mut self) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = self.rx.try_recv() {
      events.push(event);
    }
    events
  }
}
