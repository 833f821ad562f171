//! Catalog service: remote mutations mirrored locally, reads through the freshness policy.

use async_trait::async_trait;
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{
  CacheResult, Connectivity, FreshnessMarker, FreshnessPolicy, KeyValueStorage, LocalCopy,
  MirrorStore,
};
use crate::gateway::types::{
  Category, CategoryChanges, NewCategory, NewProduct, Product, ProductChanges,
};
use crate::gateway::Gateway;

/// Full content of the local mirror
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
  pub products: Vec<Product>,
  pub categories: Vec<Category>,
}

impl<S: KeyValueStorage> LocalCopy<Snapshot> for MirrorStore<S> {
  fn read_local(&self) -> Result<Snapshot> {
    Ok(Snapshot {
      products: self.get_all()?,
      categories: self.get_all()?,
    })
  }

  fn replace_local(&self, data: &Snapshot) -> Result<()> {
    self.clear()?;
    for product in &data.products {
      self.add(product)?;
    }
    for category in &data.categories {
      self.add(category)?;
    }
    Ok(())
  }
}

/// One product row of the mirror, rebuilt by updating it in place
struct MirroredProduct<'a, S: KeyValueStorage> {
  mirror: &'a MirrorStore<S>,
  id: i64,
}

impl<S: KeyValueStorage> LocalCopy<Option<Product>> for MirroredProduct<'_, S> {
  fn read_local(&self) -> Result<Option<Product>> {
    self.mirror.get_by_id(self.id)
  }

  fn replace_local(&self, data: &Option<Product>) -> Result<()> {
    if let Some(product) = data {
      if !self.mirror.update(product)? {
        debug!(id = self.id, "Fetched product is not in the mirror");
      }
    }
    Ok(())
  }
}

/// Something that can be asked to fetch (and thereby cache) an image URL
#[async_trait]
pub trait ImageWarmer: Send + Sync {
  async fn warm(&self, url: &str) -> Result<()>;
}

/// Image file to attach to a product
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
  pub file_name: String,
  pub bytes: Vec<u8>,
  pub content_type: String,
}

impl ImageUpload {
  pub fn new(file_name: &str, bytes: Vec<u8>) -> Self {
    Self {
      file_name: file_name.to_string(),
      content_type: content_type_for(file_name).to_string(),
      bytes,
    }
  }

  pub fn from_path(path: &Path) -> Result<Self> {
    let bytes = std::fs::read(path)
      .map_err(|e| eyre!("Failed to read image {}: {}", path.display(), e))?;
    let file_name = path
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .unwrap_or_default();
    Ok(Self::new(&file_name, bytes))
  }

  /// Object key unique to this upload, keeping the file extension.
  ///
  /// Identical bytes uploaded twice get two keys, so removing one product's
  /// image never touches another's.
  pub fn object_key(&self) -> String {
    static UPLOADS: AtomicU64 = AtomicU64::new(0);

    let mut hasher = Sha256::new();
    hasher.update(&self.bytes);
    hasher.update(Utc::now().timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(UPLOADS.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    match extension(&self.file_name) {
      Some(ext) => format!("{}.{}", &digest[..16], ext),
      None => digest[..16].to_string(),
    }
  }
}

fn extension(file_name: &str) -> Option<String> {
  Path::new(file_name)
    .extension()
    .map(|e| e.to_string_lossy().to_lowercase())
}

fn content_type_for(file_name: &str) -> &'static str {
  match extension(file_name).as_deref() {
    Some("jpg") | Some("jpeg") => "image/jpeg",
    Some("png") => "image/png",
    Some("webp") => "image/webp",
    Some("gif") => "image/gif",
    Some("svg") => "image/svg+xml",
    _ => "application/octet-stream",
  }
}

/// Fields for a new product
#[derive(Debug, Clone)]
pub struct ProductInput {
  pub name: String,
  pub dimensions: String,
  pub price: i64,
  pub category: String,
  pub image: Option<ImageUpload>,
}

fn required(field: &str, value: &str) -> Result<String> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(eyre!("{} is required", field));
  }
  Ok(trimmed.to_string())
}

/// Parse a price typed by a user
pub fn parse_price(input: &str) -> Result<i64> {
  input
    .trim()
    .parse()
    .map_err(|_| eyre!("Price must be a whole number, got '{}'", input.trim()))
}

/// Catalog operations over a remote gateway and a local mirror.
pub struct CatalogService<G: Gateway, S: KeyValueStorage> {
  gateway: Arc<G>,
  mirror: MirrorStore<S>,
  policy: FreshnessPolicy,
}

impl<G: Gateway, S: KeyValueStorage> CatalogService<G, S> {
  pub fn new(gateway: G, storage: Arc<S>, policy: FreshnessPolicy) -> Self {
    let mirror = MirrorStore::shared(storage)
      .with_collection::<Product>()
      .with_collection::<Category>();

    Self {
      gateway: Arc::new(gateway),
      mirror,
      policy,
    }
  }

  pub fn mirror(&self) -> &MirrorStore<S> {
    &self.mirror
  }

  pub fn gateway(&self) -> &G {
    &self.gateway
  }

  async fn fetch_snapshot(&self) -> Result<Snapshot> {
    let (products, categories) = futures::try_join!(
      self.gateway.list_products(),
      self.gateway.list_categories()
    )?;
    Ok(Snapshot {
      products,
      categories,
    })
  }

  /// Read the catalog through the freshness policy.
  pub async fn load(
    &self,
    marker: &mut FreshnessMarker,
    connectivity: Connectivity,
  ) -> Result<CacheResult<Snapshot>> {
    self
      .policy
      .read(&self.mirror, marker, connectivity, || self.fetch_snapshot())
      .await
  }

  /// Rebuild the mirror from the backend regardless of freshness, then ask
  /// `warmer` to fetch every product image.
  pub async fn refresh(
    &self,
    marker: &mut FreshnessMarker,
    connectivity: Connectivity,
    warmer: Option<&dyn ImageWarmer>,
  ) -> Result<Snapshot> {
    let snapshot = self
      .policy
      .refresh(&self.mirror, marker, connectivity, || self.fetch_snapshot())
      .await?;

    info!(
      products = snapshot.products.len(),
      categories = snapshot.categories.len(),
      "Mirror rebuilt from backend"
    );

    if let Some(warmer) = warmer {
      let urls: Vec<&str> = snapshot
        .products
        .iter()
        .map(|p| p.image_url.as_str())
        .filter(|url| !url.is_empty())
        .collect();

      let results = futures::future::join_all(urls.iter().map(|url| warmer.warm(url))).await;
      for (url, result) in urls.iter().zip(results) {
        if let Err(e) = result {
          debug!(url, error = %e, "Image prefetch failed");
        }
      }
    }

    Ok(snapshot)
  }

  /// Categories from the mirror
  pub fn categories(&self) -> Result<Vec<Category>> {
    self.mirror.get_all()
  }

  /// Single product from the mirror
  pub fn product(&self, id: i64) -> Result<Option<Product>> {
    self.mirror.get_by_id(id)
  }

  /// Read one product through the freshness policy.
  ///
  /// A remote read updates the mirrored row in place and moves the marker;
  /// rows missing from the mirror are not added.
  pub async fn load_product(
    &self,
    marker: &mut FreshnessMarker,
    connectivity: Connectivity,
    id: i64,
  ) -> Result<CacheResult<Option<Product>>> {
    let local = MirroredProduct {
      mirror: &self.mirror,
      id,
    };
    self
      .policy
      .read(&local, marker, connectivity, || self.gateway.get_product(id))
      .await
  }

  pub async fn create_category(&self, name: &str) -> Result<Category> {
    let name = required("Category name", name)?;
    let category = self
      .gateway
      .insert_category(&NewCategory { name })
      .await?;
    self.mirror.add(&category)?;
    Ok(category)
  }

  /// Rename a category. Products keep the old name as their category value.
  pub async fn rename_category(&self, id: i64, name: &str) -> Result<Option<Category>> {
    let name = required("Category name", name)?;
    let updated = self
      .gateway
      .update_category(id, &CategoryChanges { name })
      .await?;

    if let Some(category) = &updated {
      self.mirror.update(category)?;
    }
    Ok(updated)
  }

  pub async fn delete_category(&self, id: i64) -> Result<()> {
    self.gateway.delete_category(id).await?;
    self.mirror.delete::<Category>(id)
  }

  pub async fn create_product(&self, input: ProductInput) -> Result<Product> {
    let name = required("Product name", &input.name)?;
    let dimensions = required("Dimensions", &input.dimensions)?;
    let category = required("Category", &input.category)?;

    if !self.categories()?.iter().any(|c| c.name == category) {
      warn!(category = %category, "Creating product in a category unknown to the mirror");
    }

    let image_url = match &input.image {
      Some(image) => self.upload(image).await?,
      None => String::new(),
    };

    let inserted = self
      .gateway
      .insert_product(&NewProduct {
        name,
        dimensions,
        price: input.price,
        category,
        image_url: image_url.clone(),
      })
      .await;

    let product = match inserted {
      Ok(product) => product,
      Err(e) => {
        if !image_url.is_empty() {
          self.remove_image(&image_url).await;
        }
        return Err(e);
      }
    };

    self.mirror.add(&product)?;
    Ok(product)
  }

  /// Apply `changes` (and optionally a replacement image) to a product.
  ///
  /// Returns `None` when the backend has no such product.
  pub async fn update_product(
    &self,
    id: i64,
    mut changes: ProductChanges,
    image: Option<ImageUpload>,
  ) -> Result<Option<Product>> {
    for (field, value) in [
      ("Product name", &mut changes.name),
      ("Dimensions", &mut changes.dimensions),
      ("Category", &mut changes.category),
    ] {
      if let Some(value) = value {
        *value = required(field, value)?;
      }
    }

    if changes.is_empty() && image.is_none() {
      return Err(eyre!("Nothing to update"));
    }

    let previous_image = self
      .mirror
      .get_by_id::<Product>(id)?
      .map(|p| p.image_url)
      .filter(|url| !url.is_empty());

    let uploaded = match &image {
      Some(image) => Some(self.upload(image).await?),
      None => None,
    };
    if let Some(url) = &uploaded {
      changes.image_url = Some(url.clone());
    }

    let updated = match self.gateway.update_product(id, &changes).await {
      Ok(updated) => updated,
      Err(e) => {
        if let Some(url) = &uploaded {
          self.remove_image(url).await;
        }
        return Err(e);
      }
    };

    match &updated {
      Some(product) => {
        if !self.mirror.update(product)? {
          debug!(id, "Updated product is not in the mirror");
        }
        if let (Some(old), Some(new)) = (&previous_image, &uploaded) {
          if old != new {
            self.remove_image(old).await;
          }
        }
      }
      None => {
        if let Some(url) = &uploaded {
          self.remove_image(url).await;
        }
      }
    }

    Ok(updated)
  }

  /// Delete a product row and, best effort, its image.
  pub async fn delete_product(&self, id: i64) -> Result<()> {
    let image_url = self
      .mirror
      .get_by_id::<Product>(id)?
      .map(|p| p.image_url)
      .filter(|url| !url.is_empty());

    self.gateway.delete_product(id).await?;

    if let Some(url) = image_url {
      self.remove_image(&url).await;
    }

    self.mirror.delete::<Product>(id)
  }

  async fn upload(&self, image: &ImageUpload) -> Result<String> {
    let key = image.object_key();
    self
      .gateway
      .upload_image(&key, image.bytes.clone(), &image.content_type)
      .await
  }

  async fn remove_image(&self, url: &str) {
    let Some(key) = self.gateway.image_key_from_url(url) else {
      debug!(url, "Image URL is not in the image bucket, nothing to remove");
      return;
    };

    if let Err(e) = self.gateway.remove_images(&[key]).await {
      warn!(url, error = %e, "Failed to remove product image");
    }
  }
}
