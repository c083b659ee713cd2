//! REST client for the childcare-management backend.

use color_eyre::{eyre::eyre, Result};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use super::mapping::ResourceMapping;
use crate::cache::{Page, QueryDescriptor};
use crate::config::Config;
use crate::error::ApiError;

/// Remote operations the cached client needs.
pub trait Backend: Send + Sync {
  fn list(
    &self,
    resource: &str,
    descriptor: &QueryDescriptor,
  ) -> impl Future<Output = Result<Page<Value>, ApiError>> + Send;

  fn get(&self, resource: &str, id: &str) -> impl Future<Output = Result<Value, ApiError>> + Send;

  fn create(
    &self,
    resource: &str,
    body: &Value,
  ) -> impl Future<Output = Result<Value, ApiError>> + Send;

  fn update(
    &self,
    resource: &str,
    id: &str,
    body: &Value,
  ) -> impl Future<Output = Result<Value, ApiError>> + Send;

  fn delete(&self, resource: &str, id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// HTTP client for the backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct RestClient {
  client: Client,
  base_url: Url,
  token: Option<String>,
  mappings: Arc<HashMap<String, ResourceMapping>>,
}

impl RestClient {
  pub fn new(config: &Config) -> Result<Self> {
    let base_url = Url::parse(&config.api.url)
      .map_err(|e| eyre!("Invalid API url {}: {}", config.api.url, e))?;

    let client = Client::builder()
      .timeout(config.api.timeout())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url,
      token: Config::get_api_token(),
      mappings: Arc::new(config.resources.clone()),
    })
  }

  fn mapping(&self, resource: &str) -> Result<ResourceMapping, ApiError> {
    validate_resource(resource)?;
    Ok(self.mappings.get(resource).cloned().unwrap_or_default())
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
  }

  fn request(&self, method: Method, path: &str) -> RequestBuilder {
    let request = self
      .client
      .request(method, self.url(path))
      .header(reqwest::header::ACCEPT, "application/json");
    match &self.token {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }

  /// Send a request and decode the JSON body; an empty body decodes to null.
  async fn send(&self, request: RequestBuilder) -> Result<Value, ApiError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
      return Err(ApiError::from_status(status, &body));
    }
    if body.trim().is_empty() {
      return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&body)?)
  }
}

impl Backend for RestClient {
  async fn list(&self, resource: &str, descriptor: &QueryDescriptor) -> Result<Page<Value>, ApiError> {
    let mapping = self.mapping(resource)?;
    let params = mapping.query_params(descriptor);
    debug!(resource, ?params, "GET list");

    let body = self
      .send(
        self
          .request(Method::GET, &mapping.collection_path(resource))
          .query(&params),
      )
      .await?;
    mapping.parse_page(body)
  }

  async fn get(&self, resource: &str, id: &str) -> Result<Value, ApiError> {
    let mapping = self.mapping(resource)?;
    debug!(resource, id, "GET one");
    self
      .send(self.request(Method::GET, &mapping.entity_path(resource, id)))
      .await
  }

  async fn create(&self, resource: &str, body: &Value) -> Result<Value, ApiError> {
    let mapping = self.mapping(resource)?;
    debug!(resource, "POST");
    self
      .send(
        self
          .request(Method::POST, &mapping.collection_path(resource))
          .json(body),
      )
      .await
  }

  async fn update(&self, resource: &str, id: &str, body: &Value) -> Result<Value, ApiError> {
    let mapping = self.mapping(resource)?;
    debug!(resource, id, "PUT");
    self
      .send(
        self
          .request(Method::PUT, &mapping.entity_path(resource, id))
          .json(body),
      )
      .await
  }

  async fn delete(&self, resource: &str, id: &str) -> Result<(), ApiError> {
    let mapping = self.mapping(resource)?;
    debug!(resource, id, "DELETE");
    self
      .send(self.request(Method::DELETE, &mapping.entity_path(resource, id)))
      .await?;
    Ok(())
  }
}

/// Resource names become URL path segments and key prefixes.
pub fn validate_resource(resource: &str) -> Result<(), ApiError> {
  let valid = !resource.is_empty()
    && resource
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
  if valid {
    Ok(())
  } else {
    Err(ApiError::InvalidResource(resource.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(url: &str) -> RestClient {
    let config = Config::parse(&format!("api:\n  url: {}\n", url)).unwrap();
    RestClient::new(&config).unwrap()
  }

  #[test]
  fn test_validate_resource() {
    assert!(validate_resource("children").is_ok());
    assert!(validate_resource("daily-reports_v2").is_ok());
    assert!(validate_resource("").is_err());
    assert!(validate_resource("children/1").is_err());
    assert!(validate_resource("a|b").is_err());
  }

  #[test]
  fn test_url_joining() {
    assert_eq!(
      client("https://daycare.example.com/api/").url("/children"),
      "https://daycare.example.com/api/children"
    );
    assert_eq!(
      client("https://daycare.example.com").url("/children/3"),
      "https://daycare.example.com/children/3"
    );
  }

  #[tokio::test]
  async fn test_invalid_resource_fails_before_network() {
    let client = client("http://127.0.0.1:9");
    let err = client
      .list("../admin", &QueryDescriptor::new("../admin"))
      .await
      .unwrap_err();
    assert_eq!(err, ApiError::InvalidResource("../admin".into()));
  }
}
