pub mod service;
pub mod view;

pub use service::{parse_price, CatalogService, ImageUpload, ImageWarmer, ProductInput, Snapshot};
pub use view::{group_by_category, orphaned_products, CategoryGroup};
