//! Named response cache buckets.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::http::Response;
use crate::db::Database;

/// Trait for response cache backends.
///
/// Responses are keyed by absolute request URL inside a named bucket.
pub trait CacheStorage: Send + Sync {
  /// Names of all existing buckets.
  fn keys(&self) -> Result<Vec<String>>;

  fn has(&self, cache_name: &str) -> Result<bool>;

  /// Create the bucket if missing.
  fn open(&self, cache_name: &str) -> Result<()>;

  /// Drop a bucket and everything in it. Returns whether it existed.
  fn delete(&self, cache_name: &str) -> Result<bool>;

  fn match_request(&self, cache_name: &str, url: &str) -> Result<Option<Response>>;

  /// Store one response, creating the bucket if needed.
  fn put(&self, cache_name: &str, url: &str, response: &Response) -> Result<()>;

  /// Store several responses at once; either all are stored or none.
  fn put_all(&self, cache_name: &str, entries: &[(String, Response)]) -> Result<()>;

  /// Number of stored responses in a bucket.
  fn count(&self, cache_name: &str) -> Result<usize>;
}

type Buckets = BTreeMap<String, BTreeMap<String, Response>>;

/// In-memory cache buckets.
#[derive(Default)]
pub struct MemoryCacheStorage {
  buckets: Mutex<Buckets>,
}

impl MemoryCacheStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Buckets>> {
    self.buckets.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl CacheStorage for MemoryCacheStorage {
  fn keys(&self) -> Result<Vec<String>> {
    Ok(self.lock()?.keys().cloned().collect())
  }

  fn has(&self, cache_name: &str) -> Result<bool> {
    Ok(self.lock()?.contains_key(cache_name))
  }

  fn open(&self, cache_name: &str) -> Result<()> {
    self.lock()?.entry(cache_name.to_string()).or_default();
    Ok(())
  }

  fn delete(&self, cache_name: &str) -> Result<bool> {
    Ok(self.lock()?.remove(cache_name).is_some())
  }

  fn match_request(&self, cache_name: &str, url: &str) -> Result<Option<Response>> {
    Ok(
      self
        .lock()?
        .get(cache_name)
        .and_then(|bucket| bucket.get(url))
        .cloned(),
    )
  }

  fn put(&self, cache_name: &str, url: &str, response: &Response) -> Result<()> {
    self
      .lock()?
      .entry(cache_name.to_string())
      .or_default()
      .insert(url.to_string(), response.clone());
    Ok(())
  }

  fn put_all(&self, cache_name: &str, entries: &[(String, Response)]) -> Result<()> {
    let mut buckets = self.lock()?;
    let bucket = buckets.entry(cache_name.to_string()).or_default();
    for (url, response) in entries {
      bucket.insert(url.clone(), response.clone());
    }
    Ok(())
  }

  fn count(&self, cache_name: &str) -> Result<usize> {
    Ok(self.lock()?.get(cache_name).map(|b| b.len()).unwrap_or(0))
  }
}

/// SQLite-based cache buckets.
pub struct SqliteCacheStorage {
  db: Arc<Database>,
}

impl SqliteCacheStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

fn insert_response(
  conn: &rusqlite::Connection,
  cache_name: &str,
  url: &str,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR IGNORE INTO cache_names (cache_name) VALUES (?)",
      params![cache_name],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", cache_name, e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO response_cache
         (cache_name, request_url, status, status_text, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        cache_name,
        url,
        response.status,
        response.status_text,
        headers,
        response.body
      ],
    )
    .map_err(|e| eyre!("Failed to cache response for {}: {}", url, e))?;

  Ok(())
}

impl CacheStorage for SqliteCacheStorage {
  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT cache_name FROM cache_names ORDER BY cache_name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn has(&self, cache_name: &str) -> Result<bool> {
    let conn = self.db.conn()?;
    let found: Option<i64> = conn
      .query_row(
        "SELECT 1 FROM cache_names WHERE cache_name = ?",
        params![cache_name],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up cache {}: {}", cache_name, e))?;
    Ok(found.is_some())
  }

  fn open(&self, cache_name: &str) -> Result<()> {
    let conn = self.db.conn()?;
    conn
      .execute(
        "INSERT OR IGNORE INTO cache_names (cache_name) VALUES (?)",
        params![cache_name],
      )
      .map_err(|e| eyre!("Failed to open cache {}: {}", cache_name, e))?;
    Ok(())
  }

  fn delete(&self, cache_name: &str) -> Result<bool> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM response_cache WHERE cache_name = ?",
      params![cache_name],
    )
    .map_err(|e| eyre!("Failed to clear cache {}: {}", cache_name, e))?;
    let removed = tx
      .execute(
        "DELETE FROM cache_names WHERE cache_name = ?",
        params![cache_name],
      )
      .map_err(|e| eyre!("Failed to delete cache {}: {}", cache_name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(removed > 0)
  }

  fn match_request(&self, cache_name: &str, url: &str) -> Result<Option<Response>> {
    let conn = self.db.conn()?;
    let row: Option<(u16, String, String, Vec<u8>)> = conn
      .query_row(
        "SELECT status, status_text, headers, body FROM response_cache
         WHERE cache_name = ? AND request_url = ?",
        params![cache_name, url],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up cached response for {}: {}", url, e))?;

    match row {
      Some((status, status_text, headers, body)) => {
        let headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to parse cached headers for {}: {}", url, e))?;
        Ok(Some(Response {
          status,
          status_text,
          headers,
          body,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, cache_name: &str, url: &str, response: &Response) -> Result<()> {
    let conn = self.db.conn()?;
    insert_response(&conn, cache_name, url, response)
  }

  fn put_all(&self, cache_name: &str, entries: &[(String, Response)]) -> Result<()> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO cache_names (cache_name) VALUES (?)",
      params![cache_name],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", cache_name, e))?;

    for (url, response) in entries {
      insert_response(&tx, cache_name, url, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn count(&self, cache_name: &str) -> Result<usize> {
    let conn = self.db.conn()?;
    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM response_cache WHERE cache_name = ?",
        params![cache_name],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count cache {}: {}", cache_name, e))?;
    Ok(count as usize)
  }
}
