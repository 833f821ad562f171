mod app;
mod cache;
mod catalog;
mod commands;
mod config;
mod db;
mod gateway;
mod output;
mod worker;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(about = "Product catalog client with an offline mirror and caching worker")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./storefront.yaml, then $XDG_CONFIG_HOME/storefront/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Work from the local mirror without contacting the backend
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: commands::Command,
}

/// Log to a daily file under the data directory, filtered by STOREFRONT_LOG.
fn init_logging() -> Result<WorkerGuard> {
  let dir = db::data_dir()?.join("logs");
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
    &dir,
    "storefront.log",
  ));

  let filter = EnvFilter::try_from_env("STOREFRONT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .with(filter)
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging()?;

  let config = config::Config::load(args.config.as_deref())?;

  let mut app = app::App::new(config, args.offline).await?;
  app.run(args.command).await?;

  Ok(())
}
