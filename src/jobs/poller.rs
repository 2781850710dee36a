//! Status polling for asynchronous annotation batches.
//!
//! The service has no push channel, so completion is inferred by diffing
//! successive "in flight" snapshots. The poller is a two-state machine: Idle
//! (no timer) and Polling (one timer task). It returns to Idle by itself once
//! the in-flight count drops to zero.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::pending::{ItemStatus, PendingItems};
use crate::error::Result;
use crate::event::{Events, JobEvent};
use crate::photos::{PhotoApi, PhotoId, ProcessingJob, ProcessingSnapshot};

/// Something that can refresh the resource currently on display.
pub trait Revalidate: Send + Sync {
  /// Start the refresh; `None` when nothing is displayed.
  fn revalidate_active(&self) -> Option<JoinHandle<Result<u64>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
  Idle,
  Polling,
}

/// What one tick found.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
  /// Ids that left the in-flight set since the previous tick
  pub completed: Vec<PhotoId>,
  pub done: u64,
  pub expected: u64,
  pub fraction: f64,
  /// Set on the tick where the in-flight count reached zero
  pub batch_complete: Option<u64>,
}

/// Diff two successive snapshots.
pub fn reconcile(
  expected_total: u64,
  previous: &ProcessingSnapshot,
  current: &ProcessingSnapshot,
) -> TickReport {
  let done = expected_total.saturating_sub(current.processing_count);
  let fraction = if expected_total == 0 {
    1.0
  } else {
    done as f64 / expected_total as f64
  };

  TickReport {
    completed: current.completed_since(previous),
    done,
    expected: expected_total,
    fraction,
    batch_complete: (previous.processing_count > 0 && current.processing_count == 0)
      .then_some(expected_total),
  }
}

#[derive(Default)]
struct PollState {
  /// Present while Polling
  token: Option<CancellationToken>,
  task: Option<JoinHandle<()>>,
  /// Refresh started by the last completed batch
  revalidation: Option<JoinHandle<Result<u64>>>,
  expected_total: u64,
  previous: ProcessingSnapshot,
}

struct Shared {
  api: Arc<dyn PhotoApi>,
  pending: PendingItems,
  events: Events,
  revalidate: Arc<dyn Revalidate>,
  interval: Duration,
  state: Mutex<PollState>,
}

#[derive(Clone)]
pub struct StatusPoller {
  shared: Arc<Shared>,
}

impl StatusPoller {
  pub fn new(
    api: Arc<dyn PhotoApi>,
    pending: PendingItems,
    events: Events,
    revalidate: Arc<dyn Revalidate>,
    interval: Duration,
  ) -> Self {
    Self {
      shared: Arc::new(Shared {
        api,
        pending,
        events,
        revalidate,
        interval,
        state: Mutex::new(PollState::default()),
      }),
    }
  }

  pub fn phase(&self) -> PollPhase {
    if self.shared.lock().token.is_some() {
      PollPhase::Polling
    } else {
      PollPhase::Idle
    }
  }

  pub fn is_polling(&self) -> bool {
    self.phase() == PollPhase::Polling
  }

  pub fn expected_total(&self) -> u64 {
    self.shared.lock().expected_total
  }

  /// Track `job`, starting the timer if Idle.
  ///
  /// The progress denominator is replaced, not accumulated: with overlapping
  /// batches the last one submitted wins.
  pub fn start(&self, job: &ProcessingJob) {
    let mut state = self.shared.lock();
    state.expected_total = job.expected_total();

    // Seed the previous snapshot so work finishing before the first tick
    // still shows up as a completion.
    state.previous.in_flight.extend(job.photo_ids.iter().cloned());
    state.previous.processing_count = state.previous.processing_count.max(job.expected_total());

    if state.token.is_some() {
      info!(expected = state.expected_total, "new batch while polling, denominator reset");
      return;
    }

    let token = CancellationToken::new();
    state.token = Some(token.clone());
    state.task = Some(tokio::spawn(run(Arc::clone(&self.shared), token)));
    info!(expected = state.expected_total, "polling started");
  }

  /// Stop polling without waiting for the batch.
  pub fn stop(&self) {
    let mut state = self.shared.lock();
    if let Some(token) = state.token.take() {
      token.cancel();
      info!("polling stopped");
    }
    state.previous = ProcessingSnapshot::default();
  }

  /// Wait for the current polling task to end, including the refresh a
  /// completed batch starts.
  pub async fn wait_idle(&self) {
    let task = self.shared.lock().task.take();
    if let Some(task) = task {
      let _ = task.await;
    }
    // Failures were already surfaced by the loader
    let revalidation = self.shared.lock().revalidation.take();
    if let Some(revalidation) = revalidation {
      let _ = revalidation.await;
    }
  }
}

impl Shared {
  fn lock(&self) -> MutexGuard<'_, PollState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Fold `snapshot` into the state. `None` when this loop was stopped.
  fn apply(&self, token: &CancellationToken, snapshot: ProcessingSnapshot) -> Option<TickReport> {
    let mut state = self.lock();
    if token.is_cancelled() {
      return None;
    }

    let report = reconcile(state.expected_total, &state.previous, &snapshot);
    self.pending.observe_in_flight(&snapshot.in_flight);

    if report.batch_complete.is_some() {
      // Polling -> Idle
      state.token = None;
      state.previous = ProcessingSnapshot::default();
    } else {
      state.previous = snapshot;
    }
    Some(report)
  }

  /// Go Idle after a failed poll. False when the loop was already stopped.
  fn halt(&self, token: &CancellationToken) -> bool {
    let mut state = self.lock();
    if token.is_cancelled() {
      return false;
    }
    state.token = None;
    // Nothing will ever report these again
    let abandoned = std::mem::take(&mut state.previous);
    self.pending.clear(&abandoned.in_flight);
    true
  }

  fn emit(&self, report: &TickReport) {
    for photo_id in &report.completed {
      self.pending.set(photo_id, ItemStatus::Processed);
      self.events.job(JobEvent::ItemStatus {
        photo_id: photo_id.clone(),
        status: ItemStatus::Processed,
      });
    }

    self.events.job(JobEvent::Progress {
      completed: report.done,
      expected: report.expected,
      fraction: report.fraction,
    });

    if let Some(count) = report.batch_complete {
      self.events.job(JobEvent::BatchComplete { count });
    }
  }

  /// Reconcile server-side statuses, then refresh what is on screen.
  async fn finish_batch(&self, count: u64) {
    info!(count, "batch complete");
    match self.api.confirm_processing_status().await {
      Ok(photos_updated) => self.events.job(JobEvent::Reconciled { photos_updated }),
      Err(error) => self.events.error(&error),
    }
    let revalidation = self.revalidate.revalidate_active();
    self.lock().revalidation = revalidation;
  }
}

async fn run(shared: Arc<Shared>, token: CancellationToken) {
  let mut ticker = tokio::time::interval(shared.interval);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
  // The first tick completes immediately; the first poll waits one interval
  ticker.tick().await;

  loop {
    tokio::select! {
      _ = token.cancelled() => break,
      _ = ticker.tick() => {}
    }

    let polled = tokio::select! {
      biased;
      _ = token.cancelled() => break,
      polled = shared.api.batch_status() => polled,
    };

    let snapshot = match polled {
      Ok(snapshot) => snapshot,
      Err(error) => {
        // No automatic retry against the annotation service
        if shared.halt(&token) {
          shared.events.error(&error);
        }
        break;
      }
    };

    debug!(
      processing = snapshot.processing_count,
      in_flight = snapshot.in_flight.len(),
      "status polled"
    );

    let Some(report) = shared.apply(&token, snapshot) else {
      break;
    };
    shared.emit(&report);

    if let Some(count) = report.batch_complete {
      shared.finish_batch(count).await;
      break;
    }
  }
}
