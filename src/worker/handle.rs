//! Message-passing boundary between pages and the worker task.
//!
//! The worker runs on its own task and owns its state; pages only send it
//! request/response-shaped messages and await the replies.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::cache_storage::CacheStorage;
use super::http::{Request, Response};
use super::network::Network;
use super::offline::{FetchOutcome, OfflineWorker, WorkerState};
use super::shell::{Notification, Shell};
use crate::catalog::ImageWarmer;

/// Messages accepted by the worker task
#[derive(Debug)]
pub enum WorkerMessage {
  /// Resume a previously installed worker or install and activate a new one
  Start { reply: oneshot::Sender<Result<()>> },
  /// Force a fresh install and activation
  Register { reply: oneshot::Sender<Result<()>> },
  Fetch {
    request: Request,
    reply: oneshot::Sender<FetchOutcome>,
  },
  Push {
    payload: Vec<u8>,
    reply: oneshot::Sender<Result<Notification>>,
  },
  NotificationClick {
    notification: Notification,
    reply: oneshot::Sender<Result<()>>,
  },
  State { reply: oneshot::Sender<WorkerState> },
}

/// Page-side handle to a running worker
#[derive(Clone)]
pub struct WorkerHandle {
  tx: mpsc::UnboundedSender<WorkerMessage>,
  network: Arc<dyn Network>,
}

/// Spawn the worker on its own task.
///
/// `network` is what the handle uses for requests the worker declines to intercept.
pub fn spawn<C, N, H>(mut worker: OfflineWorker<C, N, H>, network: Arc<dyn Network>) -> WorkerHandle
where
  C: CacheStorage + 'static,
  N: Network + 'static,
  H: Shell + 'static,
{
  let (tx, mut rx) = mpsc::unbounded_channel();

  tokio::spawn(async move {
    while let Some(message) = rx.recv().await {
      match message {
        WorkerMessage::Start { reply } => {
          let _ = reply.send(worker.start().await);
        }
        WorkerMessage::Register { reply } => {
          let _ = reply.send(worker.register().await);
        }
        WorkerMessage::Fetch { request, reply } => {
          let _ = reply.send(worker.handle_fetch(request).await);
        }
        WorkerMessage::Push { payload, reply } => {
          let _ = reply.send(worker.handle_push(&payload));
        }
        WorkerMessage::NotificationClick {
          notification,
          reply,
        } => {
          let _ = reply.send(worker.handle_notification_click(&notification));
        }
        WorkerMessage::State { reply } => {
          let _ = reply.send(worker.state());
        }
      }
    }
    debug!("Worker task stopped");
  });

  WorkerHandle { tx, network }
}

impl WorkerHandle {
  async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> WorkerMessage) -> Result<T> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send(make(reply))
      .map_err(|_| eyre!("Worker is not running"))?;
    rx.await.map_err(|_| eyre!("Worker dropped the request"))
  }

  pub async fn start(&self) -> Result<()> {
    self.call(|reply| WorkerMessage::Start { reply }).await?
  }

  pub async fn register(&self) -> Result<()> {
    self.call(|reply| WorkerMessage::Register { reply }).await?
  }

  pub async fn state(&self) -> Result<WorkerState> {
    self.call(|reply| WorkerMessage::State { reply }).await
  }

  /// Fetch through the worker, going to the network directly when it declines.
  pub async fn fetch(&self, request: Request) -> Result<Response> {
    let outcome = self
      .call(|reply| WorkerMessage::Fetch {
        request: request.clone(),
        reply,
      })
      .await?;

    match outcome {
      FetchOutcome::Respond(response) => Ok(response),
      FetchOutcome::Bypass => self.network.fetch(&request).await,
    }
  }

  pub async fn push(&self, payload: Vec<u8>) -> Result<Notification> {
    self
      .call(|reply| WorkerMessage::Push { payload, reply })
      .await?
  }

  pub async fn notification_click(&self, notification: Notification) -> Result<()> {
    self
      .call(|reply| WorkerMessage::NotificationClick {
        notification,
        reply,
      })
      .await?
  }
}

#[async_trait]
impl ImageWarmer for WorkerHandle {
  async fn warm(&self, url: &str) -> Result<()> {
    let response = self.fetch(Request::get(url)).await?;
    if !response.is_ok() {
      return Err(eyre!("{} answered with status {}", url, response.status));
    }
    Ok(())
  }
}
