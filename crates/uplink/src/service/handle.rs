//! Cloneable handle for talking to the service task.

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::batch::UploadStrategy;
use crate::error::{Result, UploadError};
use crate::events::{EventSink, UploadEvent};
use crate::job::{UploadJob, UploadSpec};

use super::messages::ServiceCommand;

/// Client side of the upload service.
///
/// All methods are cheap: they post a command to the service mailbox and
/// await the reply. Once the service task is gone every method returns
/// [`UploadError::ServiceStopped`].
#[derive(Debug, Clone)]
pub struct UploadServiceHandle {
    commands: mpsc::Sender<ServiceCommand>,
    events: EventSink,
}

impl UploadServiceHandle {
    pub(crate) fn new(commands: mpsc::Sender<ServiceCommand>, events: EventSink) -> Self {
        Self { commands, events }
    }

    /// Validate `spec` and append it to the queue.
    pub async fn enqueue(&self, spec: UploadSpec) -> Result<UploadJob> {
        self.request(|reply| ServiceCommand::Enqueue { spec, reply })
            .await?
    }

    /// Remove a waiting job. `Ok(false)` when the id is unknown; an error
    /// when the job is currently being processed.
    pub async fn remove(&self, id: impl Into<String>) -> Result<bool> {
        self.request(|reply| ServiceCommand::Remove {
            id: id.into(),
            reply,
        })
        .await?
    }

    /// Jobs not currently running, in queue order.
    pub async fn list_waiting(&self) -> Result<Vec<UploadJob>> {
        self.request(|reply| ServiceCommand::ListWaiting { reply })
            .await
    }

    /// Drop every queued job and return how many were dropped.
    ///
    /// Calling this while a batch is active is a programmer error and
    /// panics the service task.
    pub async fn clear_queue(&self) -> Result<usize> {
        self.request(|reply| ServiceCommand::ClearQueue { reply })
            .await
    }

    /// Start draining the queue with `strategy`. Fails when a batch is
    /// already active or the queue holds nothing to upload.
    pub async fn start_batch(&self, strategy: UploadStrategy) -> Result<()> {
        self.request(|reply| ServiceCommand::StartBatch { strategy, reply })
            .await?
    }

    /// Ask the active batch to stop. The in-flight job is not interrupted;
    /// it observes the cancellation at its next checkpoint. Returns whether
    /// a batch was active to receive the request.
    pub async fn request_stop(&self) -> Result<bool> {
        self.request(|reply| ServiceCommand::RequestStop { reply })
            .await
    }

    /// Stop the service task. The in-flight job, if any, is cancelled and
    /// drained before the task exits.
    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(ServiceCommand::Shutdown)
            .await
            .map_err(|_| UploadError::ServiceStopped)
    }

    /// Subscribe to the event stream. Each subscriber gets an independent
    /// cursor; lagging subscribers lose the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ServiceCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| UploadError::ServiceStopped)?;
        reply_rx.await.map_err(|_| UploadError::ServiceStopped)
    }
}
