//! Offline worker: lifecycle and request interception.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::cache_storage::CacheStorage;
use super::http::{Request, Response};
use super::network::Network;
use super::shell::{Notification, Shell};
use crate::config::WorkerConfig;

const NOTIFICATION_ICON: &str = "/icons/icon-192x192.png";
const PRELOAD_HEADER: &str = "Service-Worker-Navigation-Preload";

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Created, not yet installed
  Parsed,
  Installing,
  Installed,
  Activating,
  /// Controlling pages and intercepting requests
  Activated,
  /// Install failed; this worker will never control pages
  Redundant,
}

/// What the worker did with an intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
  /// Answer produced by the worker
  Respond(Response),
  /// Not intercepted; the page should go to the network itself
  Bypass,
}

/// Resolved worker settings
#[derive(Debug, Clone)]
pub struct WorkerSettings {
  pub origin: Url,
  pub cache_name: String,
  pub offline_page: String,
  pub precache: Vec<String>,
  pub image_path_marker: String,
  pub navigation_preload: bool,
}

impl WorkerSettings {
  pub fn from_config(config: &WorkerConfig) -> Result<Self> {
    let origin = Url::parse(&config.origin)
      .map_err(|e| eyre!("Invalid worker origin {}: {}", config.origin, e))?;

    Ok(Self {
      origin,
      cache_name: config.cache_name.clone(),
      offline_page: config.offline_page.clone(),
      precache: config.precache.clone(),
      image_path_marker: config.image_path_marker.clone(),
      navigation_preload: config.navigation_preload,
    })
  }

  /// Absolute URL for a request path
  pub fn resolve(&self, url: &str) -> Result<String> {
    self
      .origin
      .join(url)
      .map(|u| u.to_string())
      .map_err(|e| eyre!("Invalid request URL {}: {}", url, e))
  }
}

#[derive(Debug, Deserialize)]
struct PushPayload {
  title: String,
  body: String,
}

/// Request-intercepting worker with its own cache bucket.
///
/// Images under the object-store path are served cache-first; everything
/// else is network-first with successful responses cached as they pass.
pub struct OfflineWorker<C: CacheStorage, N: Network, H: Shell> {
  settings: WorkerSettings,
  caches: Arc<C>,
  network: Arc<N>,
  shell: Arc<H>,
  state: WorkerState,
  navigation_preload_enabled: bool,
}

impl<C: CacheStorage, N: Network, H: Shell> OfflineWorker<C, N, H> {
  pub fn new(settings: WorkerSettings, caches: Arc<C>, network: Arc<N>, shell: Arc<H>) -> Self {
    Self {
      settings,
      caches,
      network,
      shell,
      state: WorkerState::Parsed,
      navigation_preload_enabled: false,
    }
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  pub fn settings(&self) -> &WorkerSettings {
    &self.settings
  }

  pub fn navigation_preload_enabled(&self) -> bool {
    self.navigation_preload_enabled
  }

  /// Install, then activate at once without waiting for older workers.
  pub async fn register(&mut self) -> Result<()> {
    self.install().await?;
    self.activate().await
  }

  /// Take over from a previous run whose install completed, or register anew.
  pub async fn start(&mut self) -> Result<()> {
    if self.caches.has(&self.settings.cache_name)? {
      debug!(cache = %self.settings.cache_name, "Cache present, resuming activated worker");
      self.state = WorkerState::Installed;
      return self.activate().await;
    }
    self.register().await
  }

  /// Fetch every precache path and store them all, or fail without storing any.
  pub async fn install(&mut self) -> Result<()> {
    self.state = WorkerState::Installing;

    let precache = self.settings.precache.clone();
    let mut entries = Vec::with_capacity(precache.len());
    for path in &precache {
      match self.fetch_for_install(path).await {
        Ok(entry) => entries.push(entry),
        Err(e) => {
          self.state = WorkerState::Redundant;
          return Err(e);
        }
      }
    }

    if let Err(e) = self
      .caches
      .put_all(&self.settings.cache_name, &entries)
    {
      self.state = WorkerState::Redundant;
      return Err(e);
    }

    info!(
      cache = %self.settings.cache_name,
      assets = entries.len(),
      "Caching essential assets"
    );
    self.state = WorkerState::Installed;
    Ok(())
  }

  async fn fetch_for_install(&self, path: &str) -> Result<(String, Response)> {
    let url = self.settings.resolve(path)?;
    let response = self
      .network
      .fetch(&Request::get(&url))
      .await
      .map_err(|e| eyre!("Install failed while fetching {}: {}", path, e))?;

    if !response.is_ok() {
      return Err(eyre!(
        "Install failed: {} answered with status {}",
        path,
        response.status
      ));
    }
    Ok((url, response))
  }

  /// Enable navigation preload, drop caches of other versions, claim pages.
  pub async fn activate(&mut self) -> Result<()> {
    if self.state != WorkerState::Installed {
      return Err(eyre!("Cannot activate a worker in state {:?}", self.state));
    }
    self.state = WorkerState::Activating;

    if self.settings.navigation_preload && self.network.supports_navigation_preload() {
      self.navigation_preload_enabled = true;
    }

    for name in self.caches.keys()? {
      if name != self.settings.cache_name {
        info!(cache = %name, "Removing old cache");
        self.caches.delete(&name)?;
      }
    }

    self.state = WorkerState::Activated;
    info!("Worker activated");
    self.shell.claim_clients()?;
    Ok(())
  }

  fn is_image(&self, url: &str) -> bool {
    url.contains(&self.settings.image_path_marker)
  }

  fn cached(&self, url: &str) -> Option<Response> {
    match self.caches.match_request(&self.settings.cache_name, url) {
      Ok(hit) => hit,
      Err(e) => {
        warn!(url, error = %e, "Cache lookup failed");
        None
      }
    }
  }

  /// Handle an intercepted request.
  pub async fn handle_fetch(&self, request: Request) -> FetchOutcome {
    if self.state != WorkerState::Activated || !request.is_get() {
      return FetchOutcome::Bypass;
    }

    let url = match self.settings.resolve(&request.url) {
      Ok(url) => url,
      Err(e) => {
        debug!(error = %e, "Not intercepting unparsable request");
        return FetchOutcome::Bypass;
      }
    };
    let mut request = Request { url, ..request };

    if self.is_image(&request.url) {
      if let Some(hit) = self.cached(&request.url) {
        debug!(url = %request.url, "Image served from cache");
        return FetchOutcome::Respond(hit);
      }
    }

    if request.is_navigation() && self.navigation_preload_enabled {
      request = request.with_header(PRELOAD_HEADER, "true");
    }

    match self.network.fetch(&request).await {
      Ok(response) => {
        if response.is_ok() {
          if let Err(e) = self
            .caches
            .put(&self.settings.cache_name, &request.url, &response)
          {
            warn!(url = %request.url, error = %e, "Failed to cache response");
          }
        }
        FetchOutcome::Respond(response)
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Network failed, trying cache");

        if let Some(hit) = self.cached(&request.url) {
          return FetchOutcome::Respond(hit);
        }

        if request.is_navigation() {
          if let Some(page) = self
            .settings
            .resolve(&self.settings.offline_page)
            .ok()
            .and_then(|url| self.cached(&url))
          {
            return FetchOutcome::Respond(page);
          }
        }

        FetchOutcome::Respond(Response::network_error())
      }
    }
  }

  /// Show a notification for a push payload of the form `{"title", "body"}`.
  pub fn handle_push(&self, payload: &[u8]) -> Result<Notification> {
    let payload: PushPayload = serde_json::from_slice(payload)
      .map_err(|e| eyre!("Failed to parse push payload: {}", e))?;

    let notification = Notification {
      title: payload.title,
      body: payload.body,
      icon: Some(NOTIFICATION_ICON.to_string()),
    };
    self.shell.show_notification(&notification)?;
    Ok(notification)
  }

  /// Dismiss the notification and bring up the app's root page.
  pub fn handle_notification_click(&self, notification: &Notification) -> Result<()> {
    self.shell.close_notification(notification)?;
    self.shell.focus_or_open("/")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::worker::cache_storage::MemoryCacheStorage;
  use crate::worker::network::fake::FakeNetwork;
  use crate::worker::shell::recording::RecordingShell;

  const ORIGIN: &str = "http://app.local";
  const IMAGE: &str = "https://abc.supabase.co/storage/v1/object/public/products/a.jpg";

  struct Fixture {
    worker: OfflineWorker<MemoryCacheStorage, FakeNetwork, RecordingShell>,
    caches: Arc<MemoryCacheStorage>,
    network: Arc<FakeNetwork>,
    shell: Arc<RecordingShell>,
  }

  fn fixture_with(network: FakeNetwork) -> Fixture {
    let settings = WorkerSettings::from_config(&WorkerConfig {
      origin: ORIGIN.to_string(),
      ..WorkerConfig::default()
    })
    .unwrap();
    let caches = Arc::new(MemoryCacheStorage::new());
    let network = Arc::new(network);
    let shell = Arc::new(RecordingShell::default());

    network.serve("http://app.local/", Response::new(200, "<html>app</html>"));
    network.serve(
      "http://app.local/offline.html",
      Response::new(200, "<html>offline</html>"),
    );

    Fixture {
      worker: OfflineWorker::new(settings, caches.clone(), network.clone(), shell.clone()),
      caches,
      network,
      shell,
    }
  }

  async fn activated() -> Fixture {
    let mut fixture = fixture_with(FakeNetwork::new());
    fixture.worker.register().await.unwrap();
    fixture
  }

  fn body(outcome: FetchOutcome) -> String {
    match outcome {
      FetchOutcome::Respond(response) => response.text(),
      FetchOutcome::Bypass => panic!("expected a response"),
    }
  }

  #[tokio::test]
  async fn test_register_precaches_and_activates() {
    let fixture = activated().await;

    assert_eq!(fixture.worker.state(), WorkerState::Activated);
    assert_eq!(fixture.caches.count("product-catalog-v1").unwrap(), 2);
    assert_eq!(fixture.shell.events(), vec!["claim".to_string()]);
  }

  #[tokio::test]
  async fn test_install_is_all_or_nothing() {
    let mut fixture = fixture_with(FakeNetwork::new());
    fixture.network.serve("http://app.local/offline.html", Response::new(500, ""));

    assert!(fixture.worker.register().await.is_err());
    assert_eq!(fixture.worker.state(), WorkerState::Redundant);
    assert!(!fixture.caches.has("product-catalog-v1").unwrap());
  }

  #[tokio::test]
  async fn test_activate_requires_install() {
    let mut fixture = fixture_with(FakeNetwork::new());
    assert!(fixture.worker.activate().await.is_err());
  }

  #[tokio::test]
  async fn test_activate_drops_other_versions() {
    let mut fixture = fixture_with(FakeNetwork::new());
    fixture.caches.open("product-catalog-v0").unwrap();
    fixture.caches.open("something-else").unwrap();

    fixture.worker.register().await.unwrap();

    assert_eq!(
      fixture.caches.keys().unwrap(),
      vec!["product-catalog-v1".to_string()]
    );
  }

  #[tokio::test]
  async fn test_navigation_preload_enabled_only_when_supported() {
    let fixture = activated().await;
    assert!(!fixture.worker.navigation_preload_enabled());

    let mut fixture = fixture_with(FakeNetwork::with_preload());
    fixture.worker.register().await.unwrap();
    assert!(fixture.worker.navigation_preload_enabled());

    fixture.worker.handle_fetch(Request::navigate("/")).await;
    let seen = fixture.network.seen.lock().unwrap().clone();
    let last = seen.last().unwrap();
    assert!(last
      .headers
      .contains(&(PRELOAD_HEADER.to_string(), "true".to_string())));
  }

  #[tokio::test]
  async fn test_start_resumes_without_network() {
    let fixture = activated().await;
    fixture.network.set_offline(true);

    let mut again = OfflineWorker::new(
      fixture.worker.settings().clone(),
      fixture.caches.clone(),
      fixture.network.clone(),
      fixture.shell.clone(),
    );
    again.start().await.unwrap();

    assert_eq!(again.state(), WorkerState::Activated);
    assert_eq!(body(again.handle_fetch(Request::navigate("/")).await), "<html>app</html>");
  }

  #[tokio::test]
  async fn test_network_success_is_cached_and_served_offline() {
    let fixture = activated().await;
    fixture
      .network
      .serve("http://app.local/api/info", Response::new(200, "v1 info"));

    let first = body(fixture.worker.handle_fetch(Request::get("/api/info")).await);
    assert_eq!(first, "v1 info");
    assert!(fixture
      .caches
      .match_request("product-catalog-v1", "http://app.local/api/info")
      .unwrap()
      .is_some());

    fixture.network.set_offline(true);
    let second = body(fixture.worker.handle_fetch(Request::get("/api/info")).await);
    assert_eq!(second, "v1 info");
  }

  #[tokio::test]
  async fn test_network_first_prefers_fresh_response() {
    let fixture = activated().await;
    fixture.network.serve("http://app.local/", Response::new(200, "<html>v2</html>"));

    let page = body(fixture.worker.handle_fetch(Request::navigate("/")).await);
    assert_eq!(page, "<html>v2</html>");
  }

  #[tokio::test]
  async fn test_error_status_not_cached() {
    let fixture = activated().await;

    let outcome = fixture.worker.handle_fetch(Request::get("/missing")).await;
    assert_eq!(
      outcome,
      FetchOutcome::Respond(Response::new(404, "Not Found"))
    );
    assert_eq!(
      fixture
        .caches
        .match_request("product-catalog-v1", "http://app.local/missing")
        .unwrap(),
      None
    );
  }

  #[tokio::test]
  async fn test_offline_navigation_gets_offline_page() {
    let fixture = activated().await;
    fixture.network.set_offline(true);

    let page = body(fixture.worker.handle_fetch(Request::navigate("/product/7")).await);
    assert_eq!(page, "<html>offline</html>");
  }

  #[tokio::test]
  async fn test_offline_subresource_gets_network_error() {
    let fixture = activated().await;
    fixture.network.set_offline(true);

    let outcome = fixture.worker.handle_fetch(Request::get("/api/other")).await;
    assert_eq!(outcome, FetchOutcome::Respond(Response::network_error()));
  }

  #[tokio::test]
  async fn test_images_are_cache_first() {
    let fixture = activated().await;
    fixture.network.serve(IMAGE, Response::new(200, "jpeg v1"));

    assert_eq!(body(fixture.worker.handle_fetch(Request::get(IMAGE)).await), "jpeg v1");
    let calls = fixture.network.calls();

    // A newer image on the network is not consulted once cached
    fixture.network.serve(IMAGE, Response::new(200, "jpeg v2"));
    assert_eq!(body(fixture.worker.handle_fetch(Request::get(IMAGE)).await), "jpeg v1");
    assert_eq!(fixture.network.calls(), calls);
  }

  #[tokio::test]
  async fn test_non_get_bypasses() {
    let fixture = activated().await;
    let calls = fixture.network.calls();

    let outcome = fixture
      .worker
      .handle_fetch(Request::get("/api/items").with_method("POST"))
      .await;

    assert_eq!(outcome, FetchOutcome::Bypass);
    assert_eq!(fixture.network.calls(), calls);
  }

  #[tokio::test]
  async fn test_not_intercepting_before_activation() {
    let fixture = fixture_with(FakeNetwork::new());
    assert_eq!(
      fixture.worker.handle_fetch(Request::get("/")).await,
      FetchOutcome::Bypass
    );
  }

  #[tokio::test]
  async fn test_push_shows_notification() {
    let fixture = activated().await;

    let notification = fixture
      .worker
      .handle_push(br#"{"title":"New arrivals","body":"3 new pillars"}"#)
      .unwrap();

    assert_eq!(notification.icon.as_deref(), Some(NOTIFICATION_ICON));
    assert!(fixture
      .shell
      .events()
      .contains(&"show:New arrivals:3 new pillars:/icons/icon-192x192.png".to_string()));
  }

  #[tokio::test]
  async fn test_malformed_push_is_an_error() {
    let fixture = activated().await;
    assert!(fixture.worker.handle_push(b"not json").is_err());
    assert!(fixture.worker.handle_push(br#"{"title":"x"}"#).is_err());
  }

  #[tokio::test]
  async fn test_notification_click_opens_root() {
    let fixture = activated().await;
    let notification = Notification {
      title: "New arrivals".to_string(),
      body: String::new(),
      icon: None,
    };

    fixture
      .worker
      .handle_notification_click(&notification)
      .unwrap();

    let events = fixture.shell.events();
    assert_eq!(
      &events[events.len() - 2..],
      &["close:New arrivals".to_string(), "open:/".to_string()]
    );
  }
}
