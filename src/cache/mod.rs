//! Local persistence and read policy for offline support.
//!
//! This module provides a backend-agnostic caching mechanism that:
//! - Mirrors remote rows into per-type ordered collections stored as JSON text
//! - Keeps a freshness marker recording the last successful remote read
//! - Decides per read whether the remote backend or the local mirror is consulted
//! - Degrades to the local mirror when the network is unavailable

mod layer;
mod mirror;
mod storage;
mod traits;

pub use layer::{Connectivity, FreshnessMarker, FreshnessPolicy, LocalCopy};
pub use mirror::MirrorStore;
pub use storage::{KeyValueStorage, MemoryStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource, MirrorRecord};
