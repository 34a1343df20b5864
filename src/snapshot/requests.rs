//! Request-driven saves and loads.
//!
//! A worker task owns the [`SaveLoadService`] and the [`World`]; other tasks
//! trigger operations through a cloneable [`RequestSender`] and receive the
//! outcome of each request on its own completion channel.

use super::guard::OperationReport;
use super::service::SaveLoadService;
use crate::core::{Result, SaveLoadError};
use crate::world::World;
use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveLoadRequest {
    Save(String),
    Load(String),
}

type Completion = oneshot::Sender<Result<OperationReport>>;

struct Envelope {
    request: SaveLoadRequest,
    completion: Completion,
}

/// Handle used to send requests to a running worker.
#[derive(Clone)]
pub struct RequestSender {
    tx: mpsc::Sender<Envelope>,
}

impl RequestSender {
    /// Queues `request` and returns the receiver of its outcome without waiting for it.
    pub async fn dispatch(
        &self,
        request: SaveLoadRequest,
    ) -> Result<oneshot::Receiver<Result<OperationReport>>> {
        let (completion, outcome) = oneshot::channel();
        self.tx
            .send(Envelope {
                request,
                completion,
            })
            .await
            .map_err(|_| SaveLoadError::WorkerClosed)?;
        Ok(outcome)
    }

    /// Queues `request` and waits for the worker to finish it.
    pub async fn submit(&self, request: SaveLoadRequest) -> Result<OperationReport> {
        let outcome = self.dispatch(request).await?;
        outcome.await.map_err(|_| SaveLoadError::WorkerClosed)?
    }

    pub async fn save(&self, save_name: impl Into<String>) -> Result<OperationReport> {
        self.submit(SaveLoadRequest::Save(save_name.into())).await
    }

    pub async fn load(&self, save_name: impl Into<String>) -> Result<OperationReport> {
        self.submit(SaveLoadRequest::Load(save_name.into())).await
    }
}

/// Spawns the worker on the current runtime.
///
/// Requests run one after another in arrival order. The worker stops once
/// every [`RequestSender`] is dropped and hands the service and the world
/// back through the join handle.
pub fn spawn_worker(
    service: SaveLoadService,
    world: World,
    capacity: usize,
) -> (RequestSender, JoinHandle<(SaveLoadService, World)>) {
    let (tx, mut rx) = mpsc::channel::<Envelope>(capacity.max(1));

    let join_handle = tokio::spawn(async move {
        let mut world = world;
        while let Some(Envelope {
            request,
            completion,
        }) = rx.recv().await
        {
            debug!("Processing {:?}", request);
            let outcome = match &request {
                SaveLoadRequest::Save(name) => service.save_async(&mut world, name, None).await,
                SaveLoadRequest::Load(name) => service.load_async(&mut world, name, None).await,
            };
            if let Err(Err(err)) = completion.send(outcome) {
                warn!("{:?} failed after its requester went away: {}", request, err);
            }
        }
        (service, world)
    });

    (RequestSender { tx }, join_handle)
}
