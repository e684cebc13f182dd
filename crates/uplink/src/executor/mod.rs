//! Upload executor strategies.
//!
//! One trait, two implementations. The batch controller picks the
//! implementation once per batch and runs every job through it.

mod automation;
mod interact;
mod transport;

pub use automation::AutomationExecutor;
pub use interact::click_with_fallback;
pub use transport::{CHUNK_SIZE, TransportExecutor};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::batch::UploadStrategy;
use crate::error::{Result, UploadError};
use crate::events::EventSink;
use crate::job::UploadJob;
use crate::progress::ProgressReporter;

/// Per-job execution environment handed to an executor.
#[derive(Clone)]
pub struct ExecContext {
    /// Batch-level cooperative cancellation token. Observed at suspension
    /// points only; nothing is interrupted mid-call.
    pub cancel: CancellationToken,
    /// Monotonic progress reporter for this job.
    pub progress: ProgressReporter,
    /// Caller-facing event sink.
    pub events: EventSink,
}

impl ExecContext {
    pub fn new(cancel: CancellationToken, progress: ProgressReporter, events: EventSink) -> Self {
        Self {
            cancel,
            progress,
            events,
        }
    }

    /// Detached context: fresh token, silent progress and events.
    pub fn detached() -> Self {
        Self {
            cancel: CancellationToken::new(),
            progress: ProgressReporter::noop(),
            events: EventSink::new(),
        }
    }

    /// Cancellation checkpoint.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        Ok(())
    }
}

/// One upload strategy, executing a single job end to end.
///
/// Implementations return the identifier assigned by the remote service and
/// surface classified errors; they never panic on collaborator failures.
#[async_trait]
pub trait UploadExecutor: Send + Sync {
    /// Which strategy this executor implements.
    fn strategy(&self) -> UploadStrategy;

    /// Perform the job's primary upload.
    async fn execute(&self, job: &UploadJob, ctx: &ExecContext) -> Result<String>;
}
