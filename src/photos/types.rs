use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use super::api_types::{de_id, de_opt_id};

/// Identifier of a photo on the provider
pub type PhotoId = String;

/// Identifier of an album or folder
pub type ResourceId = String;

/// A photo as listed in a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
  #[serde(deserialize_with = "de_id")]
  pub id: PhotoId,
  #[serde(default)]
  pub filename: Option<String>,
  #[serde(default)]
  pub processing_status: Option<String>,
  #[serde(default)]
  pub ai_metadata: Option<Value>,
  // Provider-specific fields are kept as-is
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Photo {
  pub fn new(id: impl Into<PhotoId>) -> Self {
    Self {
      id: id.into(),
      filename: None,
      processing_status: None,
      ai_metadata: None,
      extra: Map::new(),
    }
  }
}

/// An album or folder entry in the hierarchy listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
  #[serde(deserialize_with = "de_id")]
  pub id: ResourceId,
  #[serde(default)]
  pub title: String,
  #[serde(default, deserialize_with = "de_opt_id")]
  pub parent_id: Option<ResourceId>,
  #[serde(default)]
  pub item_count: u64,
}

/// One window of a paginated collection
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
  pub items: Vec<Photo>,
  pub total_count: u64,
  pub has_more: bool,
}

/// Which annotation provider to use, and with which credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
  pub provider_id: String,
  /// Sent as a request credential; server-side defaults apply when absent
  pub credential_override: Option<String>,
}

impl ProviderConfig {
  pub fn new(provider_id: impl Into<String>) -> Self {
    Self {
      provider_id: provider_id.into(),
      credential_override: None,
    }
  }

  pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
    self.credential_override = Some(credential.into());
    self
  }
}

/// A batch handed to the annotation service. Lives only until polling starts.
#[derive(Debug, Clone)]
pub struct ProcessingJob {
  pub photo_ids: BTreeSet<PhotoId>,
  pub submitted_at: DateTime<Utc>,
  pub provider: ProviderConfig,
}

impl ProcessingJob {
  pub fn expected_total(&self) -> u64 {
    self.photo_ids.len() as u64
  }
}

/// Server view of work currently in flight
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingSnapshot {
  pub processing_count: u64,
  pub in_flight: BTreeSet<PhotoId>,
}

impl ProcessingSnapshot {
  pub fn new<I, S>(processing_count: u64, in_flight: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<PhotoId>,
  {
    Self {
      processing_count,
      in_flight: in_flight.into_iter().map(Into::into).collect(),
    }
  }

  /// Ids that were in flight in `previous` and no longer are.
  pub fn completed_since(&self, previous: &ProcessingSnapshot) -> Vec<PhotoId> {
    previous
      .in_flight
      .difference(&self.in_flight)
      .cloned()
      .collect()
  }
}

/// Result of annotating a single photo
#[derive(Debug, Clone, PartialEq)]
pub enum SingleOutcome {
  Annotated { message: String, ai_metadata: Value },
  Failed { reason: String },
}
