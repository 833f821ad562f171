//! Remote data gateway: hosted row store plus object store.

pub mod api_types;
pub mod cache;
pub mod client;
#[cfg(test)]
pub mod fake;
pub mod types;

use async_trait::async_trait;
use color_eyre::Result;

use types::{Category, CategoryChanges, NewCategory, NewProduct, Product, ProductChanges};

/// Catalog operations against the hosted backend.
///
/// The backend assigns identifiers and creation timestamps and is trusted for
/// its own concurrency control; nothing here checks versions.
#[async_trait]
pub trait Gateway: Send + Sync {
  /// All products, newest first.
  async fn list_products(&self) -> Result<Vec<Product>>;

  async fn list_categories(&self) -> Result<Vec<Category>>;

  /// A single product, or `None` when no row has that id.
  async fn get_product(&self, id: i64) -> Result<Option<Product>>;

  async fn insert_product(&self, product: &NewProduct) -> Result<Product>;

  /// Returns the updated row, or `None` when no row matched.
  async fn update_product(&self, id: i64, changes: &ProductChanges) -> Result<Option<Product>>;

  async fn delete_product(&self, id: i64) -> Result<()>;

  async fn insert_category(&self, category: &NewCategory) -> Result<Category>;

  /// Returns the updated row, or `None` when no row matched.
  async fn update_category(&self, id: i64, changes: &CategoryChanges)
    -> Result<Option<Category>>;

  async fn delete_category(&self, id: i64) -> Result<()>;

  /// Upload an image object and return its public URL.
  async fn upload_image(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

  async fn remove_images(&self, keys: &[String]) -> Result<()>;

  /// Object key of an image previously returned by `upload_image`.
  fn image_key_from_url(&self, url: &str) -> Option<String>;

  /// True if the backend answers at all.
  async fn probe(&self) -> bool;
}
