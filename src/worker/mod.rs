//! Installable offline worker.
//!
//! Intercepts page requests, serving product images cache-first and
//! everything else network-first with a cache fallback, plus an offline page
//! for navigations. Runs on its own task behind [`WorkerHandle`].

mod cache_storage;
mod handle;
mod http;
mod network;
mod offline;
mod shell;

pub use cache_storage::{CacheStorage, MemoryCacheStorage, SqliteCacheStorage};
pub use handle::{spawn, WorkerHandle, WorkerMessage};
pub use http::{Request, RequestMode, Response};
pub use network::{HttpNetwork, Network};
pub use offline::{FetchOutcome, OfflineWorker, WorkerSettings, WorkerState};
pub use shell::{Notification, Shell, TerminalShell};
