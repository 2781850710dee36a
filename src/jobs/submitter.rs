use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use super::pending::{ItemStatus, PendingItems};
use crate::error::{CatalogError, Result};
use crate::event::{Events, JobEvent};
use crate::photos::{PhotoApi, PhotoId, ProcessingJob, ProviderConfig, SingleOutcome};

/// Sends annotation requests to the service.
///
/// Every failure is surfaced here, once; callers only need the `Result` to
/// decide what to do next.
#[derive(Clone)]
pub struct JobSubmitter {
  api: Arc<dyn PhotoApi>,
  pending: PendingItems,
  events: Events,
}

impl JobSubmitter {
  pub fn new(api: Arc<dyn PhotoApi>, pending: PendingItems, events: Events) -> Self {
    Self {
      api,
      pending,
      events,
    }
  }

  /// Hand `photo_ids` to the service without waiting for the annotations.
  ///
  /// Duplicate ids are collapsed. On success the returned job seeds the
  /// status poller; on failure the pending markers are cleared again.
  pub async fn submit_batch(
    &self,
    photo_ids: &[PhotoId],
    provider: &ProviderConfig,
  ) -> Result<ProcessingJob> {
    let ids = self.validate_batch(photo_ids, provider)?;
    let job = ProcessingJob {
      photo_ids: ids,
      submitted_at: Utc::now(),
      provider: provider.clone(),
    };
    let ordered: Vec<PhotoId> = job.photo_ids.iter().cloned().collect();

    self.pending.mark(&ordered, ItemStatus::Submitted);
    match self.api.submit_batch(&ordered, provider).await {
      Ok(message) => {
        info!(
          count = ordered.len(),
          provider = %provider.provider_id,
          "batch accepted"
        );
        self.events.job(JobEvent::Submitted {
          count: job.expected_total(),
          message,
        });
        Ok(job)
      }
      Err(error) => {
        self.pending.clear(&ordered);
        self.events.error(&error);
        Err(error)
      }
    }
  }

  /// Annotate one photo and wait for the result.
  pub async fn submit_single(
    &self,
    photo_id: &str,
    provider: &ProviderConfig,
  ) -> Result<SingleOutcome> {
    let photo_id = photo_id.trim();
    if photo_id.is_empty() {
      return Err(self.reject("no photo id given"));
    }
    if provider.provider_id.trim().is_empty() {
      return Err(self.reject("no provider selected"));
    }

    self.update(photo_id, ItemStatus::Processing);
    match self.api.submit_single(photo_id, provider).await {
      Ok(outcome) => {
        let status = match &outcome {
          SingleOutcome::Annotated { .. } => ItemStatus::Processed,
          SingleOutcome::Failed { reason } => ItemStatus::Failed {
            reason: reason.clone(),
          },
        };
        self.update(photo_id, status);
        Ok(outcome)
      }
      Err(error) => {
        self.pending.clear([&photo_id.to_string()]);
        self.events.error(&error);
        Err(error)
      }
    }
  }

  fn validate_batch(
    &self,
    photo_ids: &[PhotoId],
    provider: &ProviderConfig,
  ) -> Result<BTreeSet<PhotoId>> {
    if photo_ids.is_empty() {
      return Err(self.reject("no photos selected for processing"));
    }
    if photo_ids.iter().any(|id| id.trim().is_empty()) {
      return Err(self.reject("a selected photo has no identifier"));
    }
    if provider.provider_id.trim().is_empty() {
      return Err(self.reject("no provider selected"));
    }
    Ok(photo_ids.iter().cloned().collect())
  }

  fn reject(&self, reason: &str) -> CatalogError {
    let error = CatalogError::Validation(reason.to_string());
    self.events.error(&error);
    error
  }

  fn update(&self, photo_id: &str, status: ItemStatus) {
    self.pending.set(photo_id, status.clone());
    self.events.job(JobEvent::ItemStatus {
      photo_id: photo_id.to_string(),
      status,
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::event::{Event, EventHandler};
  use crate::testing::{Request, ScriptedApi};
  use serde_json::json;

  fn submitter(api: ScriptedApi) -> (JobSubmitter, Arc<ScriptedApi>, PendingItems, EventHandler) {
    let api = Arc::new(api);
    let pending = PendingItems::new();
    let (events, handler) = Events::channel();
    (
      JobSubmitter::new(api.clone(), pending.clone(), events),
      api,
      pending,
      handler,
    )
  }

  fn ids(raw: &[&str]) -> Vec<PhotoId> {
    raw.iter().map(|s| s.to_string()).collect()
  }

  #[tokio::test]
  async fn test_empty_batch_is_rejected_before_any_request() {
    let (submitter, api, _, mut events) = submitter(ScriptedApi::new());

    let result = submitter
      .submit_batch(&[], &ProviderConfig::new("openai"))
      .await;
    assert!(matches!(result, Err(CatalogError::Validation(_))));
    assert!(api.requests().is_empty());

    let events = events.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Event::Error(_)));
  }

  #[tokio::test]
  async fn test_blank_id_is_rejected() {
    let (submitter, api, _, _) = submitter(ScriptedApi::new());
    let result = submitter
      .submit_batch(&ids(&["p1", " "]), &ProviderConfig::new("openai"))
      .await;
    assert!(matches!(result, Err(CatalogError::Validation(_))));
    assert!(api.requests().is_empty());
  }

  #[tokio::test]
  async fn test_batch_marks_pending_and_sends_credential() {
    let (submitter, api, pending, mut events) = submitter(ScriptedApi::new());
    let provider = ProviderConfig::new("openai").with_credential("sk-test");

    let job = submitter
      .submit_batch(&ids(&["p2", "p1", "p2"]), &provider)
      .await
      .unwrap();
    assert_eq!(job.expected_total(), 2);
    assert_eq!(pending.outstanding(), ids(&["p1", "p2"]));
    assert_eq!(
      api.requests(),
      vec![Request::Batch {
        photo_ids: ids(&["p1", "p2"]),
        provider_id: "openai".into(),
        credential: Some("sk-test".into()),
      }]
    );
    assert!(matches!(
      events.drain()[..],
      [Event::Job(JobEvent::Submitted { count: 2, .. })]
    ));
  }

  #[tokio::test]
  async fn test_batch_failure_clears_pending() {
    let api = ScriptedApi::new().with_batch_error(CatalogError::Network("503".into()));
    let (submitter, _, pending, mut events) = submitter(api);

    let result = submitter
      .submit_batch(&ids(&["p1", "p2"]), &ProviderConfig::new("openai"))
      .await;
    assert!(matches!(result, Err(CatalogError::Network(_))));
    assert!(pending.outstanding().is_empty());

    let events = events.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Event::Error(_)));
  }

  #[tokio::test]
  async fn test_single_success() {
    let api = ScriptedApi::new().with_single(
      "p1",
      Ok(SingleOutcome::Annotated {
        message: "ok".into(),
        ai_metadata: json!({"caption": "a dog"}),
      }),
    );
    let (submitter, _, pending, mut events) = submitter(api);

    let outcome = submitter
      .submit_single("p1", &ProviderConfig::new("openai"))
      .await
      .unwrap();
    assert!(matches!(outcome, SingleOutcome::Annotated { .. }));
    assert_eq!(pending.status("p1"), Some(ItemStatus::Processed));

    let statuses: Vec<ItemStatus> = events
      .drain()
      .into_iter()
      .filter_map(|e| match e {
        Event::Job(JobEvent::ItemStatus { status, .. }) => Some(status),
        _ => None,
      })
      .collect();
    assert_eq!(statuses, vec![ItemStatus::Processing, ItemStatus::Processed]);
  }

  #[tokio::test]
  async fn test_single_reported_failure() {
    let api = ScriptedApi::new().with_single(
      "p1",
      Ok(SingleOutcome::Failed {
        reason: "unsupported format".into(),
      }),
    );
    let (submitter, _, pending, _) = submitter(api);

    let outcome = submitter
      .submit_single("p1", &ProviderConfig::new("openai"))
      .await
      .unwrap();
    assert!(matches!(outcome, SingleOutcome::Failed { .. }));
    assert_eq!(
      pending.status("p1"),
      Some(ItemStatus::Failed {
        reason: "unsupported format".into()
      })
    );
  }

  #[tokio::test]
  async fn test_single_network_failure_clears_marker() {
    let (submitter, _, pending, mut events) = submitter(ScriptedApi::new());

    let result = submitter
      .submit_single("p9", &ProviderConfig::new("openai"))
      .await;
    assert!(matches!(result, Err(CatalogError::Network(_))));
    assert_eq!(pending.status("p9"), None);
    let errors = events
      .drain()
      .into_iter()
      .filter(|e| matches!(e, Event::Error(_)))
      .count();
    assert_eq!(errors, 1);
  }
}
