//! Serde-deserializable types matching the photo service responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::types::{Page, Photo, ProcessingSnapshot, SingleOutcome};

// ============================================================================
// Identifier helpers - ids arrive as strings or integers depending on provider
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
  Text(String),
  Number(i64),
}

impl From<IdRepr> for String {
  fn from(id: IdRepr) -> Self {
    match id {
      IdRepr::Text(s) => s,
      IdRepr::Number(n) => n.to_string(),
    }
  }
}

pub fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  IdRepr::deserialize(deserializer).map(String::from)
}

pub fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(Option::<IdRepr>::deserialize(deserializer)?.map(String::from))
}

fn de_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: Deserializer<'de>,
{
  let ids: Vec<IdRepr> = Vec::deserialize(deserializer)?;
  Ok(ids.into_iter().map(String::from).collect())
}

// ============================================================================
// Responses
// ============================================================================

/// Acknowledgement of an asynchronous batch submission
#[derive(Debug, Deserialize)]
pub struct ApiMessage {
  #[serde(default)]
  pub message: String,
}

/// Single-photo processing response: `{message, ai_metadata}` or `{error}`
#[derive(Debug, Deserialize)]
pub struct ApiProcessResponse {
  pub message: Option<String>,
  pub ai_metadata: Option<Value>,
  pub error: Option<String>,
}

impl ApiProcessResponse {
  pub fn into_outcome(self) -> SingleOutcome {
    match (self.error, self.ai_metadata) {
      (Some(reason), _) => SingleOutcome::Failed { reason },
      (None, Some(ai_metadata)) => SingleOutcome::Annotated {
        message: self.message.unwrap_or_default(),
        ai_metadata,
      },
      (None, None) => SingleOutcome::Failed {
        reason: self
          .message
          .unwrap_or_else(|| "no annotation returned".to_string()),
      },
    }
  }
}

/// Batch status snapshot
#[derive(Debug, Deserialize)]
pub struct ApiBatchStatus {
  #[serde(default)]
  pub is_processing: bool,
  #[serde(default)]
  pub processing_count: u64,
  #[serde(default, deserialize_with = "de_ids")]
  pub photo_ids: Vec<String>,
}

impl From<ApiBatchStatus> for ProcessingSnapshot {
  fn from(status: ApiBatchStatus) -> Self {
    // A server that says it is idle has nothing in flight, whatever the count says
    let count = if status.is_processing {
      status.processing_count
    } else {
      0
    };
    ProcessingSnapshot::new(count, status.photo_ids)
  }
}

/// Paginated collection endpoint response
#[derive(Debug, Deserialize)]
pub struct ApiItemsPage {
  #[serde(default)]
  pub items: Vec<Photo>,
  #[serde(default)]
  pub total_count: u64,
  #[serde(default)]
  pub returned_count: u64,
  #[serde(default)]
  pub has_more: bool,
}

impl From<ApiItemsPage> for Page {
  fn from(page: ApiItemsPage) -> Self {
    Page {
      items: page.items,
      total_count: page.total_count,
      has_more: page.has_more,
    }
  }
}

/// Reconciliation response
#[derive(Debug, Deserialize)]
pub struct ApiConfirmResponse {
  #[serde(default)]
  pub photos_updated: u64,
}
