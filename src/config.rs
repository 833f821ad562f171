use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub backend: BackendConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Project URL of the hosted backend (e.g. https://abc.supabase.co)
  pub url: String,
  #[serde(default = "default_products_table")]
  pub products_table: String,
  #[serde(default = "default_categories_table")]
  pub categories_table: String,
  /// Object-store bucket holding product images
  #[serde(default = "default_image_bucket")]
  pub image_bucket: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// How long after a successful remote read the local mirror is served as-is
  #[serde(default = "default_fresh_for_secs")]
  pub fresh_for_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      fresh_for_secs: default_fresh_for_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
  /// Origin that relative request paths are resolved against
  #[serde(default = "default_origin")]
  pub origin: String,
  /// Versioned cache bucket name; any other bucket is dropped on activation
  #[serde(default = "default_cache_name")]
  pub cache_name: String,
  #[serde(default = "default_offline_page")]
  pub offline_page: String,
  /// Paths fetched and stored during install
  #[serde(default = "default_precache")]
  pub precache: Vec<String>,
  /// URL fragment identifying object-store images (served cache-first)
  #[serde(default = "default_image_path_marker")]
  pub image_path_marker: String,
  #[serde(default = "default_true")]
  pub navigation_preload: bool,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      origin: default_origin(),
      cache_name: default_cache_name(),
      offline_page: default_offline_page(),
      precache: default_precache(),
      image_path_marker: default_image_path_marker(),
      navigation_preload: true,
    }
  }
}

fn default_products_table() -> String {
  "products".to_string()
}

fn default_categories_table() -> String {
  "category".to_string()
}

fn default_image_bucket() -> String {
  "products".to_string()
}

fn default_fresh_for_secs() -> u64 {
  5 * 60
}

fn default_origin() -> String {
  "http://localhost:5173".to_string()
}

fn default_cache_name() -> String {
  "product-catalog-v1".to_string()
}

fn default_offline_page() -> String {
  "/offline.html".to_string()
}

fn default_precache() -> Vec<String> {
  vec!["/".to_string(), "/offline.html".to_string()]
}

fn default_image_path_marker() -> String {
  "/storage/v1/object/public".to_string()
}

fn default_true() -> bool {
  true
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./storefront.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/storefront/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/storefront/config.yaml\n\
                 with at least a `backend.url` entry."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("storefront.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("storefront").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    config.fresh_for()?;
    Ok(config)
  }

  /// Get the backend API key from environment variables.
  ///
  /// Checks STOREFRONT_API_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("STOREFRONT_API_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!("Backend API key not found. Set STOREFRONT_API_KEY or SUPABASE_ANON_KEY environment variable.")
      })
  }

  /// Freshness window, rejecting values chrono cannot represent
  pub fn fresh_for(&self) -> Result<chrono::Duration> {
    let secs = self.cache.fresh_for_secs;
    i64::try_from(secs)
      .ok()
      .and_then(chrono::Duration::try_seconds)
      .ok_or_else(|| eyre!("cache.fresh_for_secs is out of range: {}", secs))
  }
}
