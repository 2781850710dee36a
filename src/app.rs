use color_eyre::Result;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, info};

use crate::cache::CacheSource;
use crate::catalog::{Catalog, CollectionListing};
use crate::commands::Command;
use crate::config::Config;
use crate::error::{CatalogError, Result as CatalogResult};
use crate::event::{ErrorEvent, Event, EventHandler, Events, JobEvent, LoadEvent};
use crate::jobs::ItemStatus;
use crate::photos::{HttpPhotoClient, ProviderConfig, SingleOutcome};

/// How the process should end after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
  Success,
  Failure,
}

impl From<Exit> for ExitCode {
  fn from(exit: Exit) -> Self {
    match exit {
      Exit::Success => ExitCode::SUCCESS,
      Exit::Failure => ExitCode::FAILURE,
    }
  }
}

/// Command-line front end: runs one command and prints the events it causes.
pub struct App {
  catalog: Catalog,

  /// Receiving half of the core's event channel
  events: EventHandler,

  /// Provider for annotation commands, resolved lazily
  provider: Option<String>,

  config: Config,
}

impl App {
  pub fn new(config: Config, provider: Option<String>) -> Result<Self> {
    let api = HttpPhotoClient::new(&config.server.url, config.timeout())?;
    let cache = config.cache_store()?;
    let (tx, events) = Events::channel();
    let catalog = Catalog::new(Arc::new(api), cache, config.settings(), tx);

    Ok(Self {
      catalog,
      events,
      provider,
      config,
    })
  }

  /// Run `command` to completion.
  ///
  /// Failures inside the catalog reach the user as error events; they only
  /// decide the exit status here. `Err` is left for configuration problems.
  pub async fn run(self, command: Command) -> Result<Exit> {
    let App {
      catalog,
      mut events,
      provider,
      config,
    } = self;

    let provider = if command.needs_provider() {
      Some(config.provider(provider.as_deref())?)
    } else {
      None
    };

    info!(?command, "running");
    let work = execute(&catalog, command, provider);
    tokio::pin!(work);

    // Print events as they arrive while the command runs
    let outcome = loop {
      tokio::select! {
        outcome = &mut work => break outcome,
        Some(event) = events.next() => print_event(&event),
      }
    };
    for event in events.drain() {
      print_event(&event);
    }

    Ok(settle(outcome))
  }
}

/// Exit status for a command whose failures were already printed.
fn settle(outcome: CatalogResult<()>) -> Exit {
  match outcome {
    Ok(()) => Exit::Success,
    Err(error) => {
      debug!(%error, "command failed");
      Exit::Failure
    }
  }
}

async fn execute(
  catalog: &Catalog,
  command: Command,
  provider: Option<ProviderConfig>,
) -> CatalogResult<()> {
  match command {
    Command::Open { collection } => {
      let first = catalog.open_collection(&collection).await?;
      if let Some(background) = first.background {
        joined(catalog, background.await)?;
      }
    }
    Command::Collections => {
      let CollectionListing {
        listing,
        background,
      } = catalog.collections().await?;
      for collection in &listing.data {
        let parent = collection.parent_id.as_deref().unwrap_or("-");
        println!(
          "{:<24} {:<32} {:>6}  parent: {}",
          collection.id, collection.title, collection.item_count, parent
        );
      }
      println!("({})", source_label(listing.source));
      // Let the refresh reach the cache before the runtime goes away
      if let Some(background) = background {
        joined(catalog, background.await)?;
      }
    }
    Command::Process {
      photo_ids,
      collection,
    } => {
      if let Some(collection) = collection {
        let first = catalog.open_collection(&collection).await?;
        if let Some(background) = first.background {
          joined(catalog, background.await)?;
        }
      }
      let provider = provider.unwrap_or_else(|| ProviderConfig::new(""));
      catalog.submit_batch(&photo_ids, &provider).await?;
      catalog.poller().wait_idle().await;
    }
    Command::Annotate { photo_id } => {
      let provider = provider.unwrap_or_else(|| ProviderConfig::new(""));
      match catalog.submit_single(&photo_id, &provider).await? {
        SingleOutcome::Annotated { ai_metadata, .. } => println!("{}", ai_metadata),
        SingleOutcome::Failed { reason } => println!("failed: {}", reason),
      }
    }
    Command::Status => {
      let snapshot = catalog.batch_status().await?;
      println!("{} photo(s) in flight", snapshot.processing_count);
      for id in &snapshot.in_flight {
        println!("  {}", id);
      }
    }
    Command::Confirm => {
      catalog.confirm_processing_status().await?;
    }
    Command::ClearCache { collection } => {
      catalog.clear_cache(collection.as_deref())?;
      println!("cache cleared");
    }
  }
  Ok(())
}

/// Result of a background task; a task that died is reported like any other
/// core failure.
fn joined<T>(
  catalog: &Catalog,
  joined: std::result::Result<CatalogResult<T>, JoinError>,
) -> CatalogResult<T> {
  joined.unwrap_or_else(|e| {
    let error = CatalogError::Network(format!("background task aborted: {}", e));
    catalog.events().error(&error);
    Err(error)
  })
}

fn print_event(event: &Event) {
  match event {
    Event::Error(_) => eprintln!("{}", describe(event)),
    _ => println!("{}", describe(event)),
  }
}

fn source_label(source: CacheSource) -> &'static str {
  match source {
    CacheSource::Network => "network",
    CacheSource::CacheFresh => "cached",
    CacheSource::CacheStale => "cached, refreshing",
  }
}

/// One line of output for `event`.
pub fn describe(event: &Event) -> String {
  match event {
    Event::Load(load) => match load {
      LoadEvent::PageLoaded {
        resource_id,
        items,
        total_count,
        source,
        ..
      } => format!(
        "{}: showing {} of {} ({})",
        resource_id,
        items.len(),
        total_count,
        source_label(*source)
      ),
      LoadEvent::PageAppended {
        resource_id,
        items,
        cursor,
        ..
      } => format!("{}: +{} (now {})", resource_id, items.len(), cursor),
      LoadEvent::Progress {
        resource_id,
        loaded,
        total,
        percent,
      } => format!("{}: {}/{} ({:.0}%)", resource_id, loaded, total, percent),
      LoadEvent::Refreshed { resource_id, items } => {
        format!("{}: refreshed, {} items", resource_id, items.len())
      }
      LoadEvent::Finished {
        resource_id,
        loaded,
      } => format!("{}: done, {} items", resource_id, loaded),
    },
    Event::Job(job) => match job {
      JobEvent::Submitted { count, message } => format!("submitted {}: {}", count, message),
      JobEvent::ItemStatus { photo_id, status } => {
        let status = match status {
          ItemStatus::Submitted => "submitted".to_string(),
          ItemStatus::Processing => "processing".to_string(),
          ItemStatus::Processed => "processed".to_string(),
          ItemStatus::Failed { reason } => format!("failed ({})", reason),
        };
        format!("{}: {}", photo_id, status)
      }
      JobEvent::Progress {
        completed,
        expected,
        fraction,
      } => format!(
        "batch: {}/{} ({:.0}%)",
        completed,
        expected,
        fraction * 100.0
      ),
      JobEvent::BatchComplete { count } => format!("batch complete: {} photo(s)", count),
      JobEvent::Reconciled { photos_updated } => {
        format!("reconciled: {} photo(s) updated", photos_updated)
      }
    },
    Event::Error(ErrorEvent { kind, message }) => format!("error [{:?}]: {}", kind, message),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheStore, MemoryStorage};
  use crate::catalog::CatalogSettings;
  use crate::error::ErrorKind;
  use crate::testing::ScriptedApi;

  fn catalog(api: ScriptedApi) -> (Catalog, EventHandler) {
    let (events, handler) = Events::channel();
    let catalog = Catalog::new(
      Arc::new(api),
      CacheStore::new(MemoryStorage::new()),
      CatalogSettings::default(),
      events,
    );
    (catalog, handler)
  }

  #[tokio::test]
  async fn test_failed_command_is_reported_once() {
    let (catalog, mut events) = catalog(ScriptedApi::new());

    // Unknown collection: the first page request fails
    let command = Command::Open {
      collection: "missing".into(),
    };
    let outcome = execute(&catalog, command, None).await;
    assert!(matches!(outcome, Err(CatalogError::Network(_))));

    let errors = events
      .drain()
      .into_iter()
      .filter(|e| matches!(e, Event::Error(_)))
      .count();
    assert_eq!(errors, 1);
    // Only the exit status is left to decide
    assert_eq!(settle(outcome), Exit::Failure);
  }

  #[tokio::test]
  async fn test_successful_command_exits_cleanly() {
    let (catalog, mut events) = catalog(ScriptedApi::new().with_photos_updated(4));
    let outcome = execute(&catalog, Command::Confirm, None).await;
    assert_eq!(settle(outcome), Exit::Success);
    assert_eq!(
      events.drain(),
      vec![Event::Job(JobEvent::Reconciled { photos_updated: 4 })]
    );
  }

  #[test]
  fn test_exit_codes() {
    assert_eq!(
      format!("{:?}", ExitCode::from(Exit::Failure)),
      format!("{:?}", ExitCode::FAILURE)
    );
  }

  #[test]
  fn test_describe_progress() {
    let event = Event::Load(LoadEvent::Progress {
      resource_id: "album".into(),
      loaded: 30,
      total: 75,
      percent: 40.0,
    });
    assert_eq!(describe(&event), "album: 30/75 (40%)");

    let event = Event::Job(JobEvent::Progress {
      completed: 2,
      expected: 3,
      fraction: 2.0 / 3.0,
    });
    assert_eq!(describe(&event), "batch: 2/3 (67%)");
  }

  #[test]
  fn test_describe_item_failure_and_errors() {
    let event = Event::Job(JobEvent::ItemStatus {
      photo_id: "p1".into(),
      status: ItemStatus::Failed {
        reason: "timeout".into(),
      },
    });
    assert_eq!(describe(&event), "p1: failed (timeout)");

    let event = Event::Error(ErrorEvent {
      kind: ErrorKind::Network,
      message: "Network error: offline".into(),
    });
    assert_eq!(describe(&event), "error [Network]: Network error: offline");
  }
}
