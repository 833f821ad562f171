use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::gateway::api_types::{ApiErrorBody, ApiRemoveObjects};
use crate::gateway::types::{
  Category, CategoryChanges, NewCategory, NewProduct, Product, ProductChanges,
};
use crate::gateway::Gateway;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Row selection: equality filters plus optional ordering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowQuery {
  pub filters: Vec<(String, String)>,
  pub order: Option<(String, bool)>,
}

impl RowQuery {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
    self.filters.push((column.to_string(), value.to_string()));
    self
  }

  pub fn order(mut self, column: &str, ascending: bool) -> Self {
    self.order = Some((column.to_string(), ascending));
    self
  }

  /// Query-string pairs in the row API's filter syntax
  pub fn to_pairs(&self) -> Vec<(String, String)> {
    let mut pairs = vec![("select".to_string(), "*".to_string())];
    for (column, value) in &self.filters {
      pairs.push((column.clone(), format!("eq.{}", value)));
    }
    if let Some((column, ascending)) = &self.order {
      let direction = if *ascending { "asc" } else { "desc" };
      pairs.push(("order".to_string(), format!("{}.{}", column, direction)));
    }
    pairs
  }
}

/// Low-level client for the row API and the object store
#[derive(Clone)]
pub struct RestClient {
  http: reqwest::Client,
  base: Url,
}

impl RestClient {
  pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
    let base = Url::parse(base_url).map_err(|e| eyre!("Invalid backend URL {}: {}", base_url, e))?;

    let mut headers = HeaderMap::new();
    headers.insert(
      "apikey",
      HeaderValue::from_str(api_key).map_err(|e| eyre!("Invalid API key: {}", e))?,
    );
    headers.insert(
      AUTHORIZATION,
      HeaderValue::from_str(&format!("Bearer {}", api_key))
        .map_err(|e| eyre!("Invalid API key: {}", e))?,
    );

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base })
  }

  /// URL of a row API table
  pub fn table_url(&self, table: &str) -> Result<Url> {
    self.join(&format!("rest/v1/{}", table))
  }

  /// URL of an object for upload/download through the authenticated API
  pub fn object_url(&self, bucket: &str, key: &str) -> Result<Url> {
    self.join(&format!("storage/v1/object/{}/{}", bucket, key))
  }

  /// Publicly readable URL of an object
  pub fn public_url(&self, bucket: &str, key: &str) -> Result<Url> {
    self.join(&format!("storage/v1/object/public/{}/{}", bucket, key))
  }

  /// Object key inside `bucket` for a URL produced by `public_url`
  pub fn key_from_public_url(&self, bucket: &str, url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let prefix = self.public_url(bucket, "").ok()?;
    parsed
      .as_str()
      .strip_prefix(prefix.as_str())
      .filter(|key| !key.is_empty())
      .map(String::from)
  }

  fn join(&self, path: &str) -> Result<Url> {
    let mut base = self.base.clone();
    if !base.path().ends_with('/') {
      base.set_path(&format!("{}/", base.path()));
    }
    base
      .join(path)
      .map_err(|e| eyre!("Failed to build URL for {}: {}", path, e))
  }

  /// Select rows
  pub async fn select<T: DeserializeOwned>(&self, table: &str, query: &RowQuery) -> Result<Vec<T>> {
    debug!(table, ?query, "select");
    let response = self
      .http
      .get(self.table_url(table)?)
      .query(&query.to_pairs())
      .send()
      .await
      .map_err(|e| eyre!("Failed to query {}: {}", table, e))?;

    Self::parse_json(response, &format!("query {}", table)).await
  }

  /// Insert a row and return it as stored
  pub async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
    &self,
    table: &str,
    row: &B,
  ) -> Result<T> {
    debug!(table, "insert");
    let response = self
      .http
      .post(self.table_url(table)?)
      .query(&[("select", "*")])
      .header("Prefer", "return=representation")
      .json(&[row])
      .send()
      .await
      .map_err(|e| eyre!("Failed to insert into {}: {}", table, e))?;

    let mut rows: Vec<T> = Self::parse_json(response, &format!("insert into {}", table)).await?;
    if rows.is_empty() {
      return Err(eyre!("Insert into {} returned no row", table));
    }
    Ok(rows.remove(0))
  }

  /// Update matching rows and return them
  pub async fn update<B: Serialize + ?Sized, T: DeserializeOwned>(
    &self,
    table: &str,
    query: &RowQuery,
    changes: &B,
  ) -> Result<Vec<T>> {
    debug!(table, ?query, "update");
    let response = self
      .http
      .patch(self.table_url(table)?)
      .query(&query.to_pairs())
      .header("Prefer", "return=representation")
      .json(changes)
      .send()
      .await
      .map_err(|e| eyre!("Failed to update {}: {}", table, e))?;

    Self::parse_json(response, &format!("update {}", table)).await
  }

  /// Delete matching rows
  pub async fn delete(&self, table: &str, query: &RowQuery) -> Result<()> {
    debug!(table, ?query, "delete");
    let pairs: Vec<(String, String)> = query
      .to_pairs()
      .into_iter()
      .filter(|(k, _)| k != "select" && k != "order")
      .collect();

    let response = self
      .http
      .delete(self.table_url(table)?)
      .query(&pairs)
      .send()
      .await
      .map_err(|e| eyre!("Failed to delete from {}: {}", table, e))?;

    Self::check(response, &format!("delete from {}", table)).await?;
    Ok(())
  }

  /// Upload an object
  pub async fn upload(
    &self,
    bucket: &str,
    key: &str,
    bytes: Vec<u8>,
    content_type: &str,
  ) -> Result<()> {
    debug!(bucket, key, size = bytes.len(), "upload");
    let response = self
      .http
      .post(self.object_url(bucket, key)?)
      .header(CONTENT_TYPE, content_type)
      .body(bytes)
      .send()
      .await
      .map_err(|e| eyre!("Failed to upload {}: {}", key, e))?;

    Self::check(response, &format!("upload {}", key)).await?;
    Ok(())
  }

  /// Remove objects by key
  pub async fn remove(&self, bucket: &str, keys: &[String]) -> Result<()> {
    debug!(bucket, ?keys, "remove objects");
    let response = self
      .http
      .delete(self.join(&format!("storage/v1/object/{}", bucket))?)
      .json(&ApiRemoveObjects { prefixes: keys })
      .send()
      .await
      .map_err(|e| eyre!("Failed to remove objects: {}", e))?;

    Self::check(response, "remove objects").await?;
    Ok(())
  }

  /// True if the backend answers any HTTP request
  pub async fn probe(&self) -> bool {
    let url = match self.join("rest/v1/") {
      Ok(url) => url,
      Err(_) => return false,
    };
    match self.http.get(url).timeout(PROBE_TIMEOUT).send().await {
      Ok(_) => true,
      Err(e) => {
        debug!(error = %e, "Backend probe failed");
        false
      }
    }
  }

  async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(eyre!(
      "Failed to {} ({}): {}",
      action,
      status,
      ApiErrorBody::describe(&body)
    ))
  }

  async fn parse_json<T: DeserializeOwned>(response: reqwest::Response, action: &str) -> Result<T> {
    let response = Self::check(response, action).await?;
    response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse response to {}: {}", action, e))
  }
}

/// Catalog gateway backed by the hosted REST API
#[derive(Clone)]
pub struct RestGateway {
  client: RestClient,
  products_table: String,
  categories_table: String,
  image_bucket: String,
}

impl RestGateway {
  pub fn new(config: &Config) -> Result<Self> {
    let api_key = Config::get_api_key()?;
    let client = RestClient::new(&config.backend.url, &api_key)?;

    Ok(Self {
      client,
      products_table: config.backend.products_table.clone(),
      categories_table: config.backend.categories_table.clone(),
      image_bucket: config.backend.image_bucket.clone(),
    })
  }
}

#[async_trait]
impl Gateway for RestGateway {
  async fn list_products(&self) -> Result<Vec<Product>> {
    self
      .client
      .select(
        &self.products_table,
        &RowQuery::new().order("created_at", false),
      )
      .await
  }

  async fn list_categories(&self) -> Result<Vec<Category>> {
    self
      .client
      .select(&self.categories_table, &RowQuery::new())
      .await
  }

  async fn get_product(&self, id: i64) -> Result<Option<Product>> {
    let rows: Vec<Product> = self
      .client
      .select(&self.products_table, &RowQuery::new().eq("id", id))
      .await?;
    Ok(rows.into_iter().next())
  }

  async fn insert_product(&self, product: &NewProduct) -> Result<Product> {
    self.client.insert(&self.products_table, product).await
  }

  async fn update_product(&self, id: i64, changes: &ProductChanges) -> Result<Option<Product>> {
    let rows: Vec<Product> = self
      .client
      .update(&self.products_table, &RowQuery::new().eq("id", id), changes)
      .await?;
    Ok(rows.into_iter().next())
  }

  async fn delete_product(&self, id: i64) -> Result<()> {
    self
      .client
      .delete(&self.products_table, &RowQuery::new().eq("id", id))
      .await
  }

  async fn insert_category(&self, category: &NewCategory) -> Result<Category> {
    self.client.insert(&self.categories_table, category).await
  }

  async fn update_category(
    &self,
    id: i64,
    changes: &CategoryChanges,
  ) -> Result<Option<Category>> {
    let rows: Vec<Category> = self
      .client
      .update(&self.categories_table, &RowQuery::new().eq("id", id), changes)
      .await?;
    Ok(rows.into_iter().next())
  }

  async fn delete_category(&self, id: i64) -> Result<()> {
    self
      .client
      .delete(&self.categories_table, &RowQuery::new().eq("id", id))
      .await
  }

  async fn upload_image(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
    self
      .client
      .upload(&self.image_bucket, key, bytes, content_type)
      .await?;
    Ok(self.client.public_url(&self.image_bucket, key)?.to_string())
  }

  async fn remove_images(&self, keys: &[String]) -> Result<()> {
    self.client.remove(&self.image_bucket, keys).await
  }

  fn image_key_from_url(&self, url: &str) -> Option<String> {
    self.client.key_from_public_url(&self.image_bucket, url)
  }

  async fn probe(&self) -> bool {
    self.client.probe().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client() -> RestClient {
    RestClient::new("https://abc.supabase.co", "anon-key").unwrap()
  }

  #[test]
  fn test_row_query_pairs() {
    let query = RowQuery::new().eq("id", 7).order("created_at", false);
    assert_eq!(
      query.to_pairs(),
      vec![
        ("select".to_string(), "*".to_string()),
        ("id".to_string(), "eq.7".to_string()),
        ("order".to_string(), "created_at.desc".to_string()),
      ]
    );
  }

  #[test]
  fn test_urls() {
    let client = client();
    assert_eq!(
      client.table_url("products").unwrap().as_str(),
      "https://abc.supabase.co/rest/v1/products"
    );
    assert_eq!(
      client.public_url("products", "0a1b.jpg").unwrap().as_str(),
      "https://abc.supabase.co/storage/v1/object/public/products/0a1b.jpg"
    );
  }

  #[test]
  fn test_base_url_with_path_prefix() {
    let client = RestClient::new("http://localhost:8000/backend", "k").unwrap();
    assert_eq!(
      client.table_url("category").unwrap().as_str(),
      "http://localhost:8000/backend/rest/v1/category"
    );
  }

  #[test]
  fn test_key_from_public_url() {
    let client = client();
    assert_eq!(
      client.key_from_public_url(
        "products",
        "https://abc.supabase.co/storage/v1/object/public/products/0.7224888278122343.jpg"
      ),
      Some("0.7224888278122343.jpg".to_string())
    );
    assert_eq!(
      client.key_from_public_url("products", "https://elsewhere.example/image.jpg"),
      None
    );
    assert_eq!(client.key_from_public_url("products", ""), None);
    assert_eq!(
      client.key_from_public_url(
        "products",
        "https://other.supabase.co/storage/v1/object/public/products/a.jpg"
      ),
      None
    );
  }

  #[test]
  fn test_key_from_public_url_under_base_path() {
    let client = RestClient::new("http://localhost:8000/backend", "k").unwrap();
    let url = client.public_url("products", "a1b2.png").unwrap();

    assert_eq!(
      url.as_str(),
      "http://localhost:8000/backend/storage/v1/object/public/products/a1b2.png"
    );
    assert_eq!(
      client.key_from_public_url("products", url.as_str()),
      Some("a1b2.png".to_string())
    );
    assert_eq!(
      client.key_from_public_url(
        "products",
        "http://localhost:8000/storage/v1/object/public/products/a1b2.png"
      ),
      None
    );
  }

  #[test]
  fn test_invalid_base_url() {
    assert!(RestClient::new("not a url", "k").is_err());
  }
}
