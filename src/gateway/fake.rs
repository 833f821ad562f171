//! In-process gateway used by tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex;

use super::types::{Category, CategoryChanges, NewCategory, NewProduct, Product, ProductChanges};
use super::Gateway;

const PUBLIC_PREFIX: &str = "https://fake.backend/storage/v1/object/public/products/";

/// Gateway holding rows in memory, with switchable failure
#[derive(Default)]
pub struct MemoryGateway {
  products: Mutex<Vec<Product>>,
  categories: Mutex<Vec<Category>>,
  images: Mutex<BTreeMap<String, Vec<u8>>>,
  next_id: AtomicI64,
  failing: AtomicBool,
  failing_image_removal: AtomicBool,
  failing_row_writes: AtomicBool,
  reads: AtomicU32,
}

impl MemoryGateway {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make every network call fail until reset
  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  pub fn set_failing_image_removal(&self, failing: bool) {
    self.failing_image_removal.store(failing, Ordering::SeqCst);
  }

  /// Make product inserts and updates fail while uploads still succeed
  pub fn set_failing_row_writes(&self, failing: bool) {
    self.failing_row_writes.store(failing, Ordering::SeqCst);
  }

  fn check_row_write(&self) -> Result<()> {
    self.check()?;
    if self.failing_row_writes.load(Ordering::SeqCst) {
      return Err(eyre!("new row violates check constraint"));
    }
    Ok(())
  }

  /// Number of read calls served
  pub fn reads(&self) -> u32 {
    self.reads.load(Ordering::SeqCst)
  }

  pub fn image_keys(&self) -> Vec<String> {
    self.images.lock().unwrap().keys().cloned().collect()
  }

  /// Insert a product row directly, bypassing the service
  pub fn seed_product(&self, product: NewProduct) -> Product {
    let row = self.product_row(product);
    self.products.lock().unwrap().push(row.clone());
    row
  }

  /// Change a stored row directly, as another client would
  pub fn set_remote_price(&self, id: i64, price: i64) {
    if let Some(product) = self.products.lock().unwrap().iter_mut().find(|p| p.id == id) {
      product.price = price;
    }
  }

  fn check(&self) -> Result<()> {
    if self.failing.load(Ordering::SeqCst) {
      Err(eyre!("connection refused"))
    } else {
      Ok(())
    }
  }

  fn next(&self) -> (i64, String) {
    let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    let base: DateTime<Utc> = "2024-11-02T10:00:00Z".parse().unwrap();
    (id, (base + Duration::seconds(id)).to_rfc3339())
  }

  fn product_row(&self, product: NewProduct) -> Product {
    let (id, created_at) = self.next();
    Product {
      id,
      name: product.name,
      dimensions: product.dimensions,
      price: product.price,
      category: product.category,
      image_url: product.image_url,
      created_at: Some(created_at),
    }
  }
}

#[async_trait]
impl Gateway for MemoryGateway {
  async fn list_products(&self) -> Result<Vec<Product>> {
    self.check()?;
    self.reads.fetch_add(1, Ordering::SeqCst);
    let mut products = self.products.lock().unwrap().clone();
    products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(products)
  }

  async fn list_categories(&self) -> Result<Vec<Category>> {
    self.check()?;
    self.reads.fetch_add(1, Ordering::SeqCst);
    Ok(self.categories.lock().unwrap().clone())
  }

  async fn get_product(&self, id: i64) -> Result<Option<Product>> {
    self.check()?;
    self.reads.fetch_add(1, Ordering::SeqCst);
    Ok(
      self
        .products
        .lock()
        .unwrap()
        .iter()
        .find(|p| p.id == id)
        .cloned(),
    )
  }

  async fn insert_product(&self, product: &NewProduct) -> Result<Product> {
    self.check_row_write()?;
    let row = self.product_row(product.clone());
    self.products.lock().unwrap().push(row.clone());
    Ok(row)
  }

  async fn update_product(&self, id: i64, changes: &ProductChanges) -> Result<Option<Product>> {
    self.check_row_write()?;
    let mut products = self.products.lock().unwrap();
    Ok(products.iter_mut().find(|p| p.id == id).map(|p| {
      changes.apply_to(p);
      p.clone()
    }))
  }

  async fn delete_product(&self, id: i64) -> Result<()> {
    self.check()?;
    self.products.lock().unwrap().retain(|p| p.id != id);
    Ok(())
  }

  async fn insert_category(&self, category: &NewCategory) -> Result<Category> {
    self.check()?;
    let mut categories = self.categories.lock().unwrap();
    if categories.iter().any(|c| c.name == category.name) {
      return Err(eyre!("duplicate key value violates unique constraint"));
    }
    let (id, created_at) = self.next();
    let row = Category {
      id,
      name: category.name.clone(),
      created_at: Some(created_at),
    };
    categories.push(row.clone());
    Ok(row)
  }

  async fn update_category(
    &self,
    id: i64,
    changes: &CategoryChanges,
  ) -> Result<Option<Category>> {
    self.check()?;
    let mut categories = self.categories.lock().unwrap();
    Ok(categories.iter_mut().find(|c| c.id == id).map(|c| {
      c.name = changes.name.clone();
      c.clone()
    }))
  }

  async fn delete_category(&self, id: i64) -> Result<()> {
    self.check()?;
    self.categories.lock().unwrap().retain(|c| c.id != id);
    Ok(())
  }

  async fn upload_image(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
    self.check()?;
    self.images.lock().unwrap().insert(key.to_string(), bytes);
    Ok(format!("{}{}", PUBLIC_PREFIX, key))
  }

  async fn remove_images(&self, keys: &[String]) -> Result<()> {
    self.check()?;
    if self.failing_image_removal.load(Ordering::SeqCst) {
      return Err(eyre!("Object not found"));
    }
    let mut images = self.images.lock().unwrap();
    for key in keys {
      images.remove(key);
    }
    Ok(())
  }

  fn image_key_from_url(&self, url: &str) -> Option<String> {
    url.strip_prefix(PUBLIC_PREFIX).map(String::from)
  }

  async fn probe(&self) -> bool {
    !self.failing.load(Ordering::SeqCst)
  }
}
