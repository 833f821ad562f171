//! Terminal rendering of catalog data.

use tabled::{settings::Style, Table, Tabled};

use crate::cache::CacheResult;
use crate::catalog::CategoryGroup;
use crate::gateway::types::{Category, Product};

#[derive(Tabled)]
pub struct ProductRow {
  #[tabled(rename = "ID")]
  pub id: i64,
  #[tabled(rename = "Name")]
  pub name: String,
  #[tabled(rename = "Dimensions")]
  pub dimensions: String,
  #[tabled(rename = "Price")]
  pub price: i64,
  #[tabled(rename = "Image")]
  pub image: String,
}

impl From<&Product> for ProductRow {
  fn from(product: &Product) -> Self {
    Self {
      id: product.id,
      name: product.name.clone(),
      dimensions: product.dimensions.clone(),
      price: product.price,
      image: if product.image_url.is_empty() {
        "-".to_string()
      } else {
        "yes".to_string()
      },
    }
  }
}

#[derive(Tabled)]
pub struct CategoryRow {
  #[tabled(rename = "ID")]
  pub id: i64,
  #[tabled(rename = "Name")]
  pub name: String,
}

#[derive(Tabled)]
struct DetailRow {
  #[tabled(rename = "Field")]
  field: &'static str,
  #[tabled(rename = "Value")]
  value: String,
}

pub fn products_table<'a>(products: impl IntoIterator<Item = &'a Product>) -> String {
  let rows: Vec<ProductRow> = products.into_iter().map(ProductRow::from).collect();
  Table::new(rows).with(Style::rounded()).to_string()
}

pub fn categories_table(categories: &[Category]) -> String {
  let rows: Vec<CategoryRow> = categories
    .iter()
    .map(|c| CategoryRow {
      id: c.id,
      name: c.name.clone(),
    })
    .collect();
  Table::new(rows).with(Style::rounded()).to_string()
}

pub fn product_detail(product: &Product) -> String {
  let rows = vec![
    DetailRow {
      field: "ID",
      value: product.id.to_string(),
    },
    DetailRow {
      field: "Name",
      value: product.name.clone(),
    },
    DetailRow {
      field: "Dimensions",
      value: product.dimensions.clone(),
    },
    DetailRow {
      field: "Price",
      value: product.price.to_string(),
    },
    DetailRow {
      field: "Category",
      value: product.category.clone(),
    },
    DetailRow {
      field: "Image",
      value: product.image_url.clone(),
    },
    DetailRow {
      field: "Created",
      value: product.created_at.clone().unwrap_or_default(),
    },
  ];
  Table::new(rows).with(Style::rounded()).to_string()
}

/// Category sections, each followed by its products
pub fn grouped_listing(groups: &[CategoryGroup<'_>]) -> String {
  let mut out = String::new();
  for group in groups {
    out.push_str(&format!("== {} ==\n", group.category.name));
    if group.products.is_empty() {
      out.push_str("  (no products)\n");
    } else {
      out.push_str(&products_table(group.products.iter().copied()));
      out.push('\n');
    }
    out.push('\n');
  }
  out
}

/// One-line note on where the data came from
pub fn source_line<T>(result: &CacheResult<T>) -> String {
  match result.cached_at {
    Some(at) => format!(
      "Source: {} (last fetched {})",
      result.source.label(),
      at.format("%Y-%m-%d %H:%M:%S UTC")
    ),
    None => format!("Source: {}", result.source.label()),
  }
}
