//! Mirror implementations for catalog rows.

use crate::cache::MirrorRecord;

use super::types::{Category, Product};

impl MirrorRecord for Product {
  fn record_id(&self) -> i64 {
    self.id
  }

  fn collection() -> &'static str {
    "products"
  }
}

impl MirrorRecord for Category {
  fn record_id(&self) -> i64 {
    self.id
  }

  fn collection() -> &'static str {
    "categories"
  }
}
