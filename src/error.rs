//! Error taxonomy for the catalog core.
//!
//! Only some kinds ever reach the user. Cancellation and stale-context
//! outcomes are normal consequences of navigation and are absorbed by the
//! component that started the work.

use thiserror::Error;

/// Unified error type for the catalog core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
  /// A request failed or returned a non-success status
  #[error("Network error: {0}")]
  Network(String),

  /// The operation's cancellation token was revoked
  #[error("Operation cancelled")]
  Cancelled,

  /// A local precondition failed before any request was issued
  #[error("Invalid request: {0}")]
  Validation(String),

  /// A background result arrived after the active resource changed
  #[error("Result for {resource} arrived after the active resource changed")]
  StaleContext { resource: String },

  /// Cache backend failure (storage or serialization)
  #[error("Cache error: {0}")]
  Cache(String),
}

/// Kinds of error that are surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Network,
  Validation,
  Cache,
}

impl CatalogError {
  /// True for outcomes that must never be shown to the user.
  pub fn is_silent(&self) -> bool {
    matches!(self, Self::Cancelled | Self::StaleContext { .. })
  }

  /// The surfaced kind, or `None` for silent outcomes.
  pub fn kind(&self) -> Option<ErrorKind> {
    match self {
      Self::Network(_) => Some(ErrorKind::Network),
      Self::Validation(_) => Some(ErrorKind::Validation),
      Self::Cache(_) => Some(ErrorKind::Cache),
      Self::Cancelled | Self::StaleContext { .. } => None,
    }
  }

  pub(crate) fn stale(resource: &str) -> Self {
    Self::StaleContext {
      resource: resource.to_string(),
    }
  }
}

impl From<reqwest::Error> for CatalogError {
  fn from(e: reqwest::Error) -> Self {
    Self::Network(e.to_string())
  }
}

impl From<rusqlite::Error> for CatalogError {
  fn from(e: rusqlite::Error) -> Self {
    Self::Cache(e.to_string())
  }
}

impl From<serde_json::Error> for CatalogError {
  fn from(e: serde_json::Error) -> Self {
    Self::Cache(format!("serialization failed: {}", e))
  }
}

/// Convenience Result type for the catalog core.
pub type Result<T> = std::result::Result<T, CatalogError>;
