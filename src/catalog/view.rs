//! Grouping of products under their categories for display.

use std::collections::{HashMap, HashSet};

use crate::gateway::types::{Category, Product};

/// A category together with the products filed under its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryGroup<'a> {
  pub category: &'a Category,
  pub products: Vec<&'a Product>,
}

/// Group products by category name.
///
/// Categories keep their given order and are filtered by a case-insensitive
/// substring match of `search` on the category name. Categories without
/// products are kept with an empty list.
pub fn group_by_category<'a>(
  categories: &'a [Category],
  products: &'a [Product],
  search: &str,
) -> Vec<CategoryGroup<'a>> {
  let mut by_category: HashMap<&str, Vec<&Product>> = HashMap::new();
  for product in products {
    by_category
      .entry(product.category.as_str())
      .or_default()
      .push(product);
  }

  let needle = search.trim().to_lowercase();

  categories
    .iter()
    .filter(|c| c.name.to_lowercase().contains(&needle))
    .map(|category| CategoryGroup {
      category,
      products: by_category
        .get(category.name.as_str())
        .cloned()
        .unwrap_or_default(),
    })
    .collect()
}

/// Products whose category name matches no known category
pub fn orphaned_products<'a>(categories: &[Category], products: &'a [Product]) -> Vec<&'a Product> {
  let names: HashSet<&str> = categories.iter().map(|c| c.name.as_str()).collect();
  products
    .iter()
    .filter(|p| !names.contains(p.category.as_str()))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn category(id: i64, name: &str) -> Category {
    Category {
      id,
      name: name.to_string(),
      created_at: None,
    }
  }

  fn product(id: i64, name: &str, category: &str) -> Product {
    Product {
      id,
      name: name.to_string(),
      dimensions: "3 4".to_string(),
      price: 100,
      category: category.to_string(),
      image_url: String::new(),
      created_at: None,
    }
  }

  #[test]
  fn test_groups_follow_category_order() {
    let categories = vec![category(1, "Pillar"), category(2, "Arch"), category(3, "Dome")];
    let products = vec![
      product(10, "round pillar", "Pillar"),
      product(11, "gothic arch", "Arch"),
      product(12, "square pillar", "Pillar"),
    ];

    let groups = group_by_category(&categories, &products, "");

    let names: Vec<&str> = groups.iter().map(|g| g.category.name.as_str()).collect();
    assert_eq!(names, vec!["Pillar", "Arch", "Dome"]);
    let pillar: Vec<i64> = groups[0].products.iter().map(|p| p.id).collect();
    assert_eq!(pillar, vec![10, 12]);
    assert!(groups[2].products.is_empty());
  }

  #[test]
  fn test_search_is_case_insensitive_substring() {
    let categories = vec![category(1, "Pillar"), category(2, "Arch")];
    let groups = group_by_category(&categories, &[], "  ILL ");

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].category.name, "Pillar");
  }

  #[test]
  fn test_products_in_unknown_category() {
    let categories = vec![category(1, "Pillar")];
    let products = vec![product(10, "a", "Pillar"), product(11, "b", "Gone")];

    let groups = group_by_category(&categories, &products, "");
    assert_eq!(groups[0].products.len(), 1);

    let orphans = orphaned_products(&categories, &products);
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].id, 11);
  }
}
