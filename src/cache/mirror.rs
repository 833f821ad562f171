//! Local mirror of remote rows, one ordered collection per record type.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::KeyValueStorage;
use super::traits::MirrorRecord;

/// Ordered per-type collections persisted as JSON arrays.
///
/// Every mutation is a full read-modify-write of the affected collection.
/// Identifier uniqueness is not enforced.
pub struct MirrorStore<S: KeyValueStorage> {
  storage: Arc<S>,
  collections: Vec<&'static str>,
}

impl<S: KeyValueStorage> MirrorStore<S> {
  pub fn new(storage: S) -> Self {
    Self::shared(Arc::new(storage))
  }

  /// Create a mirror over storage that is also used elsewhere (e.g. the freshness marker).
  pub fn shared(storage: Arc<S>) -> Self {
    Self {
      storage,
      collections: Vec::new(),
    }
  }

  /// Register a record type so `clear()` removes its collection.
  pub fn with_collection<T: MirrorRecord>(mut self) -> Self {
    if !self.collections.contains(&T::collection()) {
      self.collections.push(T::collection());
    }
    self
  }

  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  /// All records of a type in stored order. Missing collection reads as empty.
  pub fn get_all<T: MirrorRecord>(&self) -> Result<Vec<T>> {
    match self.storage.get(T::collection())? {
      Some(text) => serde_json::from_str(&text).map_err(|e| {
        eyre!(
          "Failed to parse mirrored {} collection: {}",
          T::collection(),
          e
        )
      }),
      None => Ok(Vec::new()),
    }
  }

  /// Append a record and persist the whole collection.
  pub fn add<T: MirrorRecord>(&self, record: &T) -> Result<()> {
    let mut records = self.get_all::<T>()?;
    if records.iter().any(|r| r.record_id() == record.record_id()) {
      warn!(
        collection = T::collection(),
        id = record.record_id(),
        "Appending record with an identifier already present in the mirror"
      );
    }
    records.push(record.clone());
    self.write_all(&records)
  }

  /// Replace every record with a matching identifier.
  ///
  /// Returns false and leaves the stored collection untouched when nothing matches.
  pub fn update<T: MirrorRecord>(&self, record: &T) -> Result<bool> {
    let mut records = self.get_all::<T>()?;
    let mut replaced = false;

    for existing in records.iter_mut() {
      if existing.record_id() == record.record_id() {
        *existing = record.clone();
        replaced = true;
      }
    }

    if !replaced {
      debug!(
        collection = T::collection(),
        id = record.record_id(),
        "Mirror update matched no record"
      );
      return Ok(false);
    }

    self.write_all(&records)?;
    Ok(true)
  }

  /// Remove every record with the given identifier.
  pub fn delete<T: MirrorRecord>(&self, id: i64) -> Result<()> {
    let records: Vec<T> = self
      .get_all::<T>()?
      .into_iter()
      .filter(|r| r.record_id() != id)
      .collect();
    self.write_all(&records)
  }

  /// Linear scan for a record; `None` when absent.
  pub fn get_by_id<T: MirrorRecord>(&self, id: i64) -> Result<Option<T>> {
    Ok(
      self
        .get_all::<T>()?
        .into_iter()
        .find(|r| r.record_id() == id),
    )
  }

  /// Remove every registered collection.
  pub fn clear(&self) -> Result<()> {
    for collection in &self.collections {
      self.storage.remove(collection)?;
    }
    Ok(())
  }

  fn write_all<T: MirrorRecord>(&self, records: &[T]) -> Result<()> {
    let text = serde_json::to_string(records)
      .map_err(|e| eyre!("Failed to serialize {} collection: {}", T::collection(), e))?;
    self.storage.set(T::collection(), &text)
  }
}

impl<S: KeyValueStorage> Clone for MirrorStore<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      collections: self.collections.clone(),
    }
  }
}
