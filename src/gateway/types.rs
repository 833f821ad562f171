use serde::{Deserialize, Deserializer, Serialize};

/// Product row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
  pub id: i64,
  pub name: String,
  pub dimensions: String,
  pub price: i64,
  /// Name of the owning category (joined by value, not by id)
  pub category: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub image_url: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<String>,
}

/// Category row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
  pub id: i64,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<String>,
}

/// Product insert payload (id and created_at are assigned by the backend)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProduct {
  pub name: String,
  pub dimensions: String,
  pub price: i64,
  pub category: String,
  pub image_url: String,
}

/// Partial product update; unset fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductChanges {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub dimensions: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub price: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_url: Option<String>,
}

impl ProductChanges {
  pub fn is_empty(&self) -> bool {
    self == &Self::default()
  }

  /// Apply the changes to a local copy.
  pub fn apply_to(&self, product: &mut Product) {
    if let Some(name) = &self.name {
      product.name = name.clone();
    }
    if let Some(dimensions) = &self.dimensions {
      product.dimensions = dimensions.clone();
    }
    if let Some(price) = self.price {
      product.price = price;
    }
    if let Some(category) = &self.category {
      product.category = category.clone();
    }
    if let Some(image_url) = &self.image_url {
      product.image_url = image_url.clone();
    }
  }
}

/// Category insert payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCategory {
  pub name: String,
}

/// Category update payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryChanges {
  pub name: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
