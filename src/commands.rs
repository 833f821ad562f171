/// Command-line surface
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// List products grouped by category
  List {
    /// Only show categories whose name contains this text
    #[arg(short, long, default_value = "")]
    search: String,
  },
  /// Rebuild the local mirror from the backend and prefetch product images
  Refresh,
  /// Show a single product from the local mirror
  Show { id: i64 },
  /// Manage categories
  #[command(subcommand)]
  Category(CategoryCommand),
  /// Manage products
  #[command(subcommand)]
  Product(ProductCommand),
  /// Drive the offline worker
  #[command(subcommand)]
  Worker(WorkerCommand),
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
  /// List categories from the local mirror
  List,
  Add { name: String },
  Rename { id: i64, name: String },
  Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum ProductCommand {
  Add(ProductFields),
  Edit {
    id: i64,
    #[command(flatten)]
    fields: ProductEdits,
  },
  Delete { id: i64 },
}

#[derive(Args, Debug)]
pub struct ProductFields {
  #[arg(long)]
  pub name: String,
  #[arg(long)]
  pub dimensions: String,
  #[arg(long)]
  pub price: String,
  #[arg(long)]
  pub category: String,
  /// Image file to upload
  #[arg(long)]
  pub image: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ProductEdits {
  #[arg(long)]
  pub name: Option<String>,
  #[arg(long)]
  pub dimensions: Option<String>,
  #[arg(long)]
  pub price: Option<String>,
  #[arg(long)]
  pub category: Option<String>,
  /// Replacement image file
  #[arg(long)]
  pub image: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum WorkerCommand {
  /// Resume the installed worker, installing it if needed
  Start,
  /// Install and activate from scratch
  Install,
  /// Show worker state and cache buckets
  Status,
  /// Fetch a URL through the worker
  Fetch {
    url: String,
    /// Treat as a page navigation
    #[arg(long)]
    navigate: bool,
    #[arg(long, default_value = "GET")]
    method: String,
  },
  /// Deliver a push payload, e.g. '{"title":"New","body":"3 new items"}'
  Push { payload: String },
  /// Simulate a click on a notification
  Click {
    #[arg(long, default_value = "")]
    title: String,
  },
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct TestCli {
    #[command(subcommand)]
    command: Command,
  }

  #[test]
  fn test_parse_product_add() {
    let cli = TestCli::try_parse_from([
      "storefront",
      "product",
      "add",
      "--name",
      "round pillar",
      "--dimensions",
      "3 4",
      "--price",
      "123423",
      "--category",
      "pillar",
    ])
    .unwrap();

    match cli.command {
      Command::Product(ProductCommand::Add(fields)) => {
        assert_eq!(fields.name, "round pillar");
        assert_eq!(fields.price, "123423");
        assert!(fields.image.is_none());
      }
      other => panic!("unexpected command {:?}", other),
    }
  }

  #[test]
  fn test_parse_worker_fetch() {
    let cli =
      TestCli::try_parse_from(["storefront", "worker", "fetch", "/", "--navigate"]).unwrap();

    match cli.command {
      Command::Worker(WorkerCommand::Fetch {
        url,
        navigate,
        method,
      }) => {
        assert_eq!(url, "/");
        assert!(navigate);
        assert_eq!(method, "GET");
      }
      other => panic!("unexpected command {:?}", other),
    }
  }

  #[test]
  fn test_parse_list_defaults() {
    let cli = TestCli::try_parse_from(["storefront", "list"]).unwrap();
    assert!(matches!(cli.command, Command::List { search } if search.is_empty()));
  }
}
