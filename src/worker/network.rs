//! Network access used by the worker.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;

use super::http::{Request, Response};

/// Performs requests on behalf of the worker.
///
/// An `Err` means the request never produced a response (offline, DNS,
/// timeout). HTTP error statuses come back as `Ok` responses.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response>;

  /// Whether navigation requests can be started before the worker handles them
  fn supports_navigation_preload(&self) -> bool {
    false
  }
}

/// Network backed by reqwest
#[derive(Clone)]
pub struct HttpNetwork {
  http: reqwest::Client,
}

impl HttpNetwork {
  pub fn new() -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;
    Ok(Self { http })
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let mut builder = self.http.request(method, &request.url);
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body: body.to_vec(),
    })
  }

  fn supports_navigation_preload(&self) -> bool {
    true
  }
}
