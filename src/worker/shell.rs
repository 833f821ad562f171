//! Notification display and window control available to the worker.

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A displayed notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  #[serde(default)]
  pub icon: Option<String>,
}

/// Host environment the worker can act on
pub trait Shell: Send + Sync {
  fn show_notification(&self, notification: &Notification) -> Result<()>;

  fn close_notification(&self, notification: &Notification) -> Result<()>;

  /// Focus an existing window at `url`, or open one.
  fn focus_or_open(&self, url: &str) -> Result<()>;

  /// Start controlling already-open pages.
  fn claim_clients(&self) -> Result<()>;
}

/// Shell that reports to the terminal
#[derive(Debug, Default)]
pub struct TerminalShell;

impl Shell for TerminalShell {
  fn show_notification(&self, notification: &Notification) -> Result<()> {
    info!(title = %notification.title, "Showing notification");
    println!("[{}] {}", notification.title, notification.body);
    Ok(())
  }

  fn close_notification(&self, notification: &Notification) -> Result<()> {
    info!(title = %notification.title, "Closing notification");
    Ok(())
  }

  fn focus_or_open(&self, url: &str) -> Result<()> {
    info!(url, "Opening window");
    println!("Open {}", url);
    Ok(())
  }

  fn claim_clients(&self) -> Result<()> {
    info!("Claimed clients");
    Ok(())
  }
}
