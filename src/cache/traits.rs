//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Trait for records that can be mirrored locally.
///
/// Implementors provide the identifier used for update/delete/lookup and the
/// name of the collection they are stored under.
pub trait MirrorRecord: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Identifier assigned by the remote backend
  fn record_id(&self) -> i64;

  /// Storage key of the collection holding this record type (e.g. "products")
  fn collection() -> &'static str;
}

/// Result from a read, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the mirror was last refreshed from the network (if known)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from mirrored data.
  pub fn from_cache(data: T, cached_at: Option<DateTime<Utc>>, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      cached_at,
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at,
    }
  }

  pub fn is_from_network(&self) -> bool {
    self.source == CacheSource::Network
  }
}

/// Indicates where data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Mirror data, still inside the freshness window
  CacheFresh,
  /// Mirror data served because the network read failed
  CacheStale,
  /// Offline mode - network unavailable, serving mirrored data
  Offline,
}

impl CacheSource {
  pub fn label(&self) -> &'static str {
    match self {
      CacheSource::Network => "network",
      CacheSource::CacheFresh => "local mirror (fresh)",
      CacheSource::CacheStale => "local mirror (stale, backend unavailable)",
      CacheSource::Offline => "local mirror (offline)",
    }
  }
}
