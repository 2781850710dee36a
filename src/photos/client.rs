use color_eyre::{eyre::eyre, Result as EyreResult};
use futures::future::BoxFuture;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::error::{CatalogError, Result};
use crate::photos::api_types::{
  ApiBatchStatus, ApiConfirmResponse, ApiItemsPage, ApiMessage, ApiProcessResponse,
};
use crate::photos::types::{
  Collection, Page, PhotoId, ProcessingSnapshot, ProviderConfig, SingleOutcome,
};

/// Header carrying a per-request provider credential.
pub const CREDENTIAL_HEADER: &str = "X-Provider-Api-Key";

/// The endpoints the catalog core consumes.
///
/// Returned futures borrow only `self`; implementations copy whatever they
/// need from the other arguments before building the future.
pub trait PhotoApi: Send + Sync {
  /// `GET /collection/{id}/items?skip={n}&limit={m}`
  fn fetch_page(&self, resource_id: &str, skip: u64, limit: u64) -> BoxFuture<'_, Result<Page>>;

  /// `POST /photos/process/batch?provider={id}`, returns the acknowledgement message
  fn submit_batch(
    &self,
    photo_ids: &[PhotoId],
    provider: &ProviderConfig,
  ) -> BoxFuture<'_, Result<String>>;

  /// `POST /photos/{id}/process?provider={id}`
  fn submit_single(
    &self,
    photo_id: &str,
    provider: &ProviderConfig,
  ) -> BoxFuture<'_, Result<SingleOutcome>>;

  /// `GET /photos/batch/status`
  fn batch_status(&self) -> BoxFuture<'_, Result<ProcessingSnapshot>>;

  /// `POST /photos/confirm-processing-status`, returns how many photos changed
  fn confirm_processing_status(&self) -> BoxFuture<'_, Result<u64>>;

  /// `GET /collections`
  fn collections(&self) -> BoxFuture<'_, Result<Vec<Collection>>>;
}

/// HTTP implementation of [`PhotoApi`]
#[derive(Clone)]
pub struct HttpPhotoClient {
  http: reqwest::Client,
  base: Url,
}

impl HttpPhotoClient {
  pub fn new(base_url: &str, timeout: Duration) -> EyreResult<Self> {
    let base =
      Url::parse(base_url).map_err(|e| eyre!("Invalid server url {}: {}", base_url, e))?;
    if base.cannot_be_a_base() {
      return Err(eyre!("Server url {} cannot be used as a base", base_url));
    }

    let http = reqwest::Client::builder()
      .user_agent(concat!("photocat/", env!("CARGO_PKG_VERSION")))
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base })
  }

  /// Base url with `segments` appended, each one percent-encoded.
  fn endpoint(&self, segments: &[&str]) -> Url {
    let mut url = self.base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    url
  }

  fn items_url(&self, resource_id: &str, skip: u64, limit: u64) -> Url {
    let mut url = self.endpoint(&["collection", resource_id, "items"]);
    url
      .query_pairs_mut()
      .append_pair("skip", &skip.to_string())
      .append_pair("limit", &limit.to_string());
    url
  }

  fn batch_url(&self, provider: &ProviderConfig) -> Url {
    let mut url = self.endpoint(&["photos", "process", "batch"]);
    url
      .query_pairs_mut()
      .append_pair("provider", &provider.provider_id);
    url
  }

  fn single_url(&self, photo_id: &str, provider: &ProviderConfig) -> Url {
    let mut url = self.endpoint(&["photos", photo_id, "process"]);
    url
      .query_pairs_mut()
      .append_pair("provider", &provider.provider_id);
    url
  }

  fn authorize(request: RequestBuilder, provider: &ProviderConfig) -> RequestBuilder {
    match &provider.credential_override {
      Some(key) => request.header(CREDENTIAL_HEADER, key),
      None => request,
    }
  }

  async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request.send().await?.error_for_status()?;
    Ok(response.json::<T>().await?)
  }
}

impl PhotoApi for HttpPhotoClient {
  fn fetch_page(&self, resource_id: &str, skip: u64, limit: u64) -> BoxFuture<'_, Result<Page>> {
    let url = self.items_url(resource_id, skip, limit);
    Box::pin(async move {
      let page: ApiItemsPage = Self::send_json(self.http.get(url)).await?;
      Ok(page.into())
    })
  }

  fn submit_batch(
    &self,
    photo_ids: &[PhotoId],
    provider: &ProviderConfig,
  ) -> BoxFuture<'_, Result<String>> {
    let request = Self::authorize(self.http.post(self.batch_url(provider)), provider).json(photo_ids);
    Box::pin(async move {
      let ack: ApiMessage = Self::send_json(request).await?;
      Ok(ack.message)
    })
  }

  fn submit_single(
    &self,
    photo_id: &str,
    provider: &ProviderConfig,
  ) -> BoxFuture<'_, Result<SingleOutcome>> {
    let request = Self::authorize(self.http.post(self.single_url(photo_id, provider)), provider);
    Box::pin(async move {
      let response = request.send().await?;
      let status = response.status();
      let body = response
        .json::<ApiProcessResponse>()
        .await
        .map_err(CatalogError::from);
      classify_single(status, body)
    })
  }

  fn batch_status(&self) -> BoxFuture<'_, Result<ProcessingSnapshot>> {
    let url = self.endpoint(&["photos", "batch", "status"]);
    Box::pin(async move {
      let status: ApiBatchStatus = Self::send_json(self.http.get(url)).await?;
      Ok(status.into())
    })
  }

  fn confirm_processing_status(&self) -> BoxFuture<'_, Result<u64>> {
    let url = self.endpoint(&["photos", "confirm-processing-status"]);
    Box::pin(async move {
      let response: ApiConfirmResponse = Self::send_json(self.http.post(url)).await?;
      Ok(response.photos_updated)
    })
  }

  fn collections(&self) -> BoxFuture<'_, Result<Vec<Collection>>> {
    let url = self.endpoint(&["collections"]);
    Box::pin(async move { Self::send_json(self.http.get(url)).await })
  }
}

/// Outcome of a single-photo request from its status and decoded body.
///
/// Failures come back as `{error}`, often with a non-success status.
fn classify_single(
  status: StatusCode,
  body: Result<ApiProcessResponse>,
) -> Result<SingleOutcome> {
  match body {
    Ok(body) if status.is_success() || body.error.is_some() => Ok(body.into_outcome()),
    Err(e) if status.is_success() => Err(e),
    _ => Err(CatalogError::Network(format!(
      "Processing request failed with status {}",
      status
    ))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn response(value: serde_json::Value) -> Result<ApiProcessResponse> {
    Ok(serde_json::from_value(value).unwrap())
  }

  fn client(base: &str) -> HttpPhotoClient {
    HttpPhotoClient::new(base, Duration::from_secs(5)).unwrap()
  }

  #[test]
  fn test_items_url() {
    let c = client("http://localhost:8000/api");
    assert_eq!(
      c.items_url("album 1", 30, 30).as_str(),
      "http://localhost:8000/api/collection/album%201/items?skip=30&limit=30"
    );
  }

  #[test]
  fn test_trailing_slash_base() {
    let c = client("http://localhost:8000/api/");
    assert_eq!(
      c.endpoint(&["photos", "batch", "status"]).as_str(),
      "http://localhost:8000/api/photos/batch/status"
    );
  }

  #[test]
  fn test_provider_query() {
    let c = client("http://localhost:8000");
    let provider = ProviderConfig::new("openai");
    assert_eq!(
      c.batch_url(&provider).as_str(),
      "http://localhost:8000/photos/process/batch?provider=openai"
    );
    assert_eq!(
      c.single_url("p/7", &provider).as_str(),
      "http://localhost:8000/photos/p%2F7/process?provider=openai"
    );
  }

  #[test]
  fn test_rejects_non_base_url() {
    assert!(HttpPhotoClient::new("mailto:someone@example.com", Duration::from_secs(1)).is_err());
    assert!(HttpPhotoClient::new("not a url", Duration::from_secs(1)).is_err());
  }

  #[test]
  fn test_single_success_is_annotated() {
    let body = response(json!({"message": "done", "ai_metadata": {"tags": ["cat"]}}));
    assert_eq!(
      classify_single(StatusCode::OK, body).unwrap(),
      SingleOutcome::Annotated {
        message: "done".into(),
        ai_metadata: json!({"tags": ["cat"]}),
      }
    );
  }

  #[test]
  fn test_single_error_body_is_a_failed_outcome() {
    let body = response(json!({"error": "provider quota exceeded"}));
    assert_eq!(
      classify_single(StatusCode::INTERNAL_SERVER_ERROR, body).unwrap(),
      SingleOutcome::Failed {
        reason: "provider quota exceeded".into()
      }
    );
  }

  #[test]
  fn test_single_bad_status_without_error_is_network() {
    let body = response(json!({"message": "oops"}));
    let err = classify_single(StatusCode::INTERNAL_SERVER_ERROR, body).unwrap_err();
    assert_eq!(
      err,
      CatalogError::Network("Processing request failed with status 500 Internal Server Error".into())
    );

    let unreadable = Err(CatalogError::Network("error decoding response body".into()));
    let err = classify_single(StatusCode::BAD_GATEWAY, unreadable).unwrap_err();
    assert!(err.to_string().contains("502"));
  }

  #[test]
  fn test_single_unreadable_success_keeps_decode_error() {
    let decode = CatalogError::Network("error decoding response body".into());
    let err = classify_single(StatusCode::OK, Err(decode.clone())).unwrap_err();
    assert_eq!(err, decode);
  }

  #[test]
  fn test_credential_header() {
    let c = client("http://localhost:8000");
    let url = c.single_url("p1", &ProviderConfig::new("openai"));

    let provider = ProviderConfig::new("openai").with_credential("sk-test");
    let request = HttpPhotoClient::authorize(c.http.post(url.clone()), &provider)
      .build()
      .unwrap();
    assert_eq!(
      request.headers().get(CREDENTIAL_HEADER).unwrap(),
      "sk-test"
    );

    // Without an override the server's own credentials apply
    let request = HttpPhotoClient::authorize(c.http.post(url), &ProviderConfig::new("openai"))
      .build()
      .unwrap();
    assert!(request.headers().get(CREDENTIAL_HEADER).is_none());
  }
}
