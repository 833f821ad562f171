use crate::cache::{Connectivity, FreshnessMarker, FreshnessPolicy, SqliteStorage};
use crate::catalog::{
  group_by_category, orphaned_products, parse_price, CatalogService, ImageUpload, ImageWarmer,
  ProductInput,
};
use crate::commands::{CategoryCommand, Command, ProductCommand, ProductEdits, WorkerCommand};
use crate::config::Config;
use crate::db::Database;
use crate::gateway::client::RestGateway;
use crate::gateway::types::ProductChanges;
use crate::gateway::Gateway;
use crate::output;
use crate::worker::{
  spawn, CacheStorage, HttpNetwork, Notification, OfflineWorker, Request, SqliteCacheStorage,
  TerminalShell, WorkerHandle, WorkerSettings,
};
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Main application state
pub struct App<G: Gateway> {
  config: Config,
  db: Arc<Database>,
  storage: Arc<SqliteStorage>,
  catalog: CatalogService<G, SqliteStorage>,
  connectivity: Connectivity,
}

impl App<RestGateway> {
  /// Open the local database and probe the backend unless `offline` forces offline mode.
  pub async fn new(config: Config, offline: bool) -> Result<Self> {
    let db = Arc::new(Database::open()?);
    let gateway = RestGateway::new(&config)?;

    let connectivity = if offline {
      Connectivity::Offline
    } else if gateway.probe().await {
      Connectivity::Online
    } else {
      warn!(url = %config.backend.url, "Backend unreachable, working offline");
      Connectivity::Offline
    };

    Self::with_parts(config, gateway, db, connectivity)
  }
}

impl<G: Gateway> App<G> {
  pub fn with_parts(
    config: Config,
    gateway: G,
    db: Arc<Database>,
    connectivity: Connectivity,
  ) -> Result<Self> {
    let storage = Arc::new(SqliteStorage::new(db.clone()));
    let policy = FreshnessPolicy::new().with_fresh_for(config.fresh_for()?);
    let catalog = CatalogService::new(gateway, storage.clone(), policy);

    Ok(Self {
      config,
      db,
      storage,
      catalog,
      connectivity,
    })
  }

  pub async fn run(&mut self, command: Command) -> Result<()> {
    let out = self.execute(command).await?;
    if !out.is_empty() {
      println!("{}", out.trim_end());
    }
    Ok(())
  }

  async fn execute(&mut self, command: Command) -> Result<String> {
    match command {
      Command::List { search } => self.list(&search).await,
      Command::Refresh => self.refresh().await,
      Command::Show { id } => self.show(id).await,
      Command::Category(command) => self.category(command).await,
      Command::Product(command) => self.product(command).await,
      Command::Worker(command) => self.worker(command).await,
    }
  }

  async fn list(&self, search: &str) -> Result<String> {
    let mut marker = FreshnessMarker::load(self.storage.as_ref())?;
    let result = self.catalog.load(&mut marker, self.connectivity).await?;
    marker.save(self.storage.as_ref())?;

    let snapshot = &result.data;
    let groups = group_by_category(&snapshot.categories, &snapshot.products, search);

    let mut out = output::grouped_listing(&groups);
    let orphans = orphaned_products(&snapshot.categories, &snapshot.products);
    if !orphans.is_empty() && search.trim().is_empty() {
      out.push_str("== (no category) ==\n");
      out.push_str(&output::products_table(orphans));
      out.push_str("\n\n");
    }
    out.push_str(&output::source_line(&result));
    Ok(out)
  }

  async fn show(&self, id: i64) -> Result<String> {
    let mut marker = FreshnessMarker::load(self.storage.as_ref())?;
    let result = self
      .catalog
      .load_product(&mut marker, self.connectivity, id)
      .await?;
    marker.save(self.storage.as_ref())?;

    let product = result
      .data
      .as_ref()
      .ok_or_else(|| eyre!("Product {} not found", id))?;
    Ok(format!(
      "{}\n{}",
      output::product_detail(product),
      output::source_line(&result)
    ))
  }

  async fn refresh(&self) -> Result<String> {
    let mut marker = FreshnessMarker::load(self.storage.as_ref())?;

    let warmer = match self.connectivity {
      Connectivity::Offline => None,
      Connectivity::Online => {
        let worker = self.spawn_worker()?;
        match worker.start().await {
          Ok(()) => Some(worker),
          Err(e) => {
            warn!(error = %e, "Worker unavailable, images will not be prefetched");
            None
          }
        }
      }
    };

    let snapshot = self
      .catalog
      .refresh(
        &mut marker,
        self.connectivity,
        warmer.as_ref().map(|w| w as &dyn ImageWarmer),
      )
      .await?;
    marker.save(self.storage.as_ref())?;

    Ok(format!(
      "Refreshed {} products in {} categories",
      snapshot.products.len(),
      snapshot.categories.len()
    ))
  }

  fn require_online(&self) -> Result<()> {
    match self.connectivity {
      Connectivity::Online => Ok(()),
      Connectivity::Offline => Err(eyre!(
        "You are offline. Changes require an internet connection."
      )),
    }
  }

  async fn category(&self, command: CategoryCommand) -> Result<String> {
    if !matches!(command, CategoryCommand::List) {
      self.require_online()?;
    }

    match command {
      CategoryCommand::List => Ok(output::categories_table(&self.catalog.categories()?)),
      CategoryCommand::Add { name } => {
        let category = self.catalog.create_category(&name).await?;
        Ok(format!("Created category {} ({})", category.name, category.id))
      }
      CategoryCommand::Rename { id, name } => {
        let category = self
          .catalog
          .rename_category(id, &name)
          .await?
          .ok_or_else(|| eyre!("No category with id {}", id))?;
        Ok(format!("Renamed category {} to {}", id, category.name))
      }
      CategoryCommand::Delete { id } => {
        self.catalog.delete_category(id).await?;
        Ok(format!("Deleted category {}", id))
      }
    }
  }

  async fn product(&self, command: ProductCommand) -> Result<String> {
    self.require_online()?;

    match command {
      ProductCommand::Add(fields) => {
        let input = ProductInput {
          name: fields.name,
          dimensions: fields.dimensions,
          price: parse_price(&fields.price)?,
          category: fields.category,
          image: fields
            .image
            .as_deref()
            .map(ImageUpload::from_path)
            .transpose()?,
        };
        let product = self.catalog.create_product(input).await?;
        Ok(format!("Created product {} ({})", product.name, product.id))
      }
      ProductCommand::Edit { id, fields } => {
        let (changes, image) = changes_from(fields)?;
        let product = self
          .catalog
          .update_product(id, changes, image)
          .await?
          .ok_or_else(|| eyre!("No product with id {}", id))?;
        Ok(output::product_detail(&product))
      }
      ProductCommand::Delete { id } => {
        self.catalog.delete_product(id).await?;
        Ok(format!("Deleted product {}", id))
      }
    }
  }

  fn spawn_worker(&self) -> Result<WorkerHandle> {
    let settings = WorkerSettings::from_config(&self.config.worker)?;
    let caches = Arc::new(SqliteCacheStorage::new(self.db.clone()));
    let network = Arc::new(HttpNetwork::new()?);

    let worker = OfflineWorker::new(settings, caches, network.clone(), Arc::new(TerminalShell));
    Ok(spawn(worker, network))
  }

  async fn started_worker(&self) -> Result<WorkerHandle> {
    let worker = self.spawn_worker()?;
    worker.start().await?;
    Ok(worker)
  }

  async fn worker(&self, command: WorkerCommand) -> Result<String> {
    match command {
      WorkerCommand::Start => {
        let worker = self.started_worker().await?;
        Ok(format!("Worker {:?}", worker.state().await?))
      }
      WorkerCommand::Install => {
        let worker = self.spawn_worker()?;
        worker.register().await?;
        info!("Worker installed");
        Ok(format!("Worker {:?}", worker.state().await?))
      }
      WorkerCommand::Status => self.worker_status(),
      WorkerCommand::Fetch {
        url,
        navigate,
        method,
      } => {
        let worker = self.started_worker().await?;
        let url = WorkerSettings::from_config(&self.config.worker)?.resolve(&url)?;
        let request = if navigate {
          Request::navigate(&url)
        } else {
          Request::get(&url)
        };
        let request = request.with_method(&method);

        let response = worker.fetch(request).await?;
        Ok(format!(
          "{} {}\n\n{}",
          response.status,
          response.status_text,
          response.text()
        ))
      }
      WorkerCommand::Push { payload } => {
        let worker = self.started_worker().await?;
        let notification = worker.push(payload.into_bytes()).await?;
        Ok(format!("Shown notification: {}", notification.title))
      }
      WorkerCommand::Click { title } => {
        let worker = self.started_worker().await?;
        worker
          .notification_click(Notification {
            title,
            body: String::new(),
            icon: None,
          })
          .await?;
        Ok(String::new())
      }
    }
  }

  fn worker_status(&self) -> Result<String> {
    let caches = SqliteCacheStorage::new(self.db.clone());
    let current = &self.config.worker.cache_name;

    let mut out = if caches.has(current)? {
      format!("Worker installed, cache {}\n", current)
    } else {
      "Worker not installed\n".to_string()
    };
    for name in caches.keys()? {
      out.push_str(&format!("  {}: {} entries\n", name, caches.count(&name)?));
    }
    Ok(out)
  }
}

fn changes_from(fields: ProductEdits) -> Result<(ProductChanges, Option<ImageUpload>)> {
  let image = fields
    .image
    .as_deref()
    .map(ImageUpload::from_path)
    .transpose()?;
  let changes = ProductChanges {
    name: fields.name,
    dimensions: fields.dimensions,
    price: fields.price.as_deref().map(parse_price).transpose()?,
    category: fields.category,
    image_url: None,
  };
  Ok((changes, image))
}
