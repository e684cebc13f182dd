//! Command messages for the upload service task.
//!
//! Every mutation of the queue or the batch travels through one of these
//! variants; replies come back over per-request oneshot channels.

use tokio::sync::oneshot;

use crate::batch::UploadStrategy;
use crate::error::Result;
use crate::job::{UploadJob, UploadSpec};

/// Messages accepted by the service task.
#[derive(Debug)]
pub enum ServiceCommand {
    /// Validate a spec and append it to the queue.
    Enqueue {
        spec: UploadSpec,
        reply: oneshot::Sender<Result<UploadJob>>,
    },
    /// Remove a waiting job by id. Refused for the job currently running.
    Remove {
        id: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    /// Snapshot of the jobs not currently running, in queue order.
    ListWaiting {
        reply: oneshot::Sender<Vec<UploadJob>>,
    },
    /// Drop every queued job. Only legal while no batch is active.
    ClearQueue { reply: oneshot::Sender<usize> },
    /// Begin draining the queue with the given strategy.
    StartBatch {
        strategy: UploadStrategy,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Ask the active batch to stop after the in-flight job settles.
    RequestStop { reply: oneshot::Sender<bool> },
    /// Stop the service task itself.
    Shutdown,
}
