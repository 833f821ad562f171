//! Freshness policy deciding between the remote backend and the local mirror.

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use tracing::{debug, warn};

use super::storage::KeyValueStorage;
use super::traits::CacheResult;

/// Whether the remote backend is believed reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
  Online,
  Offline,
}

/// Time of the last successful remote read.
///
/// Passed explicitly to the policy; callers decide whether and where it is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreshnessMarker {
  last_fetched: Option<DateTime<Utc>>,
}

impl FreshnessMarker {
  /// Key the marker is persisted under.
  pub const STORAGE_KEY: &'static str = "last_fetched";

  pub fn never() -> Self {
    Self::default()
  }

  pub fn at(time: DateTime<Utc>) -> Self {
    Self {
      last_fetched: Some(time),
    }
  }

  pub fn last_fetched(&self) -> Option<DateTime<Utc>> {
    self.last_fetched
  }

  pub fn record(&mut self, time: DateTime<Utc>) {
    self.last_fetched = Some(time);
  }

  /// Load the persisted marker. An unreadable value counts as never fetched.
  pub fn load<S: KeyValueStorage + ?Sized>(storage: &S) -> Result<Self> {
    let Some(text) = storage.get(Self::STORAGE_KEY)? else {
      return Ok(Self::never());
    };

    match DateTime::parse_from_rfc3339(&text) {
      Ok(time) => Ok(Self::at(time.with_timezone(&Utc))),
      Err(e) => {
        warn!(value = %text, error = %e, "Ignoring unparsable freshness marker");
        Ok(Self::never())
      }
    }
  }

  pub fn save<S: KeyValueStorage + ?Sized>(&self, storage: &S) -> Result<()> {
    match self.last_fetched {
      Some(time) => storage.set(Self::STORAGE_KEY, &time.to_rfc3339()),
      None => storage.remove(Self::STORAGE_KEY),
    }
  }
}

/// Local copy the policy falls back to and rebuilds after remote reads.
pub trait LocalCopy<T> {
  /// Read the full local copy.
  fn read_local(&self) -> Result<T>;

  /// Wipe the local copy and repopulate it from `data`.
  fn replace_local(&self, data: &T) -> Result<()>;
}

/// Read policy that prefers the local mirror inside a freshness window.
///
/// Within the window the mirror is served even when online, trading up to
/// `fresh_for` of staleness for fewer remote requests.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessPolicy {
  fresh_for: Duration,
}

impl Default for FreshnessPolicy {
  fn default() -> Self {
    Self::new()
  }
}

impl FreshnessPolicy {
  pub fn new() -> Self {
    Self {
      fresh_for: Duration::minutes(5),
    }
  }

  pub fn with_fresh_for(mut self, fresh_for: Duration) -> Self {
    self.fresh_for = fresh_for;
    self
  }

  /// True if the last successful remote read is younger than the window.
  pub fn is_fresh(&self, marker: &FreshnessMarker, now: DateTime<Utc>) -> bool {
    marker
      .last_fetched()
      .map(|t| now - t < self.fresh_for)
      .unwrap_or(false)
  }

  /// Read through the policy.
  ///
  /// 1. Inside the freshness window - serve the local copy
  /// 2. Offline - serve the local copy
  /// 3. Otherwise fetch; on success rebuild the local copy and move the marker
  /// 4. On fetch failure - serve the local copy
  pub async fn read<T, L, F, Fut>(
    &self,
    local: &L,
    marker: &mut FreshnessMarker,
    connectivity: Connectivity,
    fetcher: F,
  ) -> Result<CacheResult<T>>
  where
    L: LocalCopy<T>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let now = Utc::now();

    if self.is_fresh(marker, now) {
      debug!(last_fetched = ?marker.last_fetched(), "Serving local mirror inside freshness window");
      return Ok(CacheResult::from_cache(
        local.read_local()?,
        marker.last_fetched(),
        false,
      ));
    }

    if connectivity == Connectivity::Offline {
      debug!("Offline, serving local mirror");
      return Ok(CacheResult::offline(
        local.read_local()?,
        marker.last_fetched(),
      ));
    }

    match fetcher().await {
      Ok(data) => {
        match local.replace_local(&data) {
          Ok(()) => marker.record(now),
          Err(e) => warn!(error = %e, "Failed to rebuild local mirror"),
        }
        Ok(CacheResult::from_network(data))
      }
      Err(e) => {
        warn!(error = %e, "Remote read failed, falling back to local mirror");
        Ok(CacheResult::from_cache(
          local.read_local()?,
          marker.last_fetched(),
          true,
        ))
      }
    }
  }

  /// Explicit refresh that ignores the freshness window.
  ///
  /// Fails when offline or when the fetch fails; the local copy is only
  /// replaced after a successful fetch.
  pub async fn refresh<T, L, F, Fut>(
    &self,
    local: &L,
    marker: &mut FreshnessMarker,
    connectivity: Connectivity,
    fetcher: F,
  ) -> Result<T>
  where
    L: LocalCopy<T>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    if connectivity == Connectivity::Offline {
      return Err(eyre!(
        "You are offline. Refetching data requires an internet connection."
      ));
    }

    let data = fetcher().await?;
    local.replace_local(&data)?;
    marker.record(Utc::now());
    Ok(data)
  }
}
