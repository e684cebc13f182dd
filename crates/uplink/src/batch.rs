//! Batch lifecycle: strategy selection and the complete-once state machine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, UploadError};

/// Which executor a batch runs its jobs through. Selected once per batch,
/// never per job: the two paths contend for different external resources
/// (API quota vs. a single browser profile) and must not interleave.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum UploadStrategy {
    /// Resumable chunked transfer against the remote API.
    #[default]
    Transport,
    /// Browser-driven upload through the web UI.
    Automation,
}

/// Batch lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum BatchPhase {
    /// No batch has run yet, or the previous one finished.
    Idle,
    /// Draining the queue.
    Running,
    /// Stop requested; the in-flight job may still be completing.
    Stopping,
    /// Terminal. A new batch may be started.
    Finished,
}

/// Process-wide batch state, owned by the service task.
///
/// `finish` is guarded by an atomic swap so the terminal notification fires
/// exactly once even when several code paths race to deliver it.
#[derive(Debug)]
pub struct BatchState {
    phase: BatchPhase,
    strategy: UploadStrategy,
    current_job_id: Option<String>,
    cancel: CancellationToken,
    finished_once: Arc<AtomicBool>,
}

impl Default for BatchState {
    fn default() -> Self {
        Self {
            phase: BatchPhase::Idle,
            strategy: UploadStrategy::default(),
            current_job_id: None,
            cancel: CancellationToken::new(),
            finished_once: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a brand-new batch: resets the complete-once guard, arms a fresh
    /// cancellation token, and records the first job about to run.
    ///
    /// Only legal from `Idle` or `Finished`.
    pub fn start(&mut self, strategy: UploadStrategy, first_job_id: impl Into<String>) -> Result<()> {
        match self.phase {
            BatchPhase::Idle | BatchPhase::Finished => {}
            phase => {
                return Err(UploadError::invalid_transition(
                    phase.to_string(),
                    BatchPhase::Running.to_string(),
                ));
            }
        }
        self.phase = BatchPhase::Running;
        self.strategy = strategy;
        self.current_job_id = Some(first_job_id.into());
        self.cancel = CancellationToken::new();
        self.finished_once = Arc::new(AtomicBool::new(false));
        info!(strategy = %strategy, "Batch started");
        Ok(())
    }

    /// Cooperative stop: flips the phase and cancels the batch token. The
    /// in-flight job observes the token at its next suspension point; nothing
    /// is interrupted forcibly. Returns whether an active batch was asked to
    /// stop.
    pub fn request_stop(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        if self.phase == BatchPhase::Running {
            self.phase = BatchPhase::Stopping;
        }
        info!("Batch stop requested");
        self.cancel.cancel();
        true
    }

    /// Terminal transition, idempotent. Returns true exactly once per batch;
    /// the caller emits the single batch-finished notification on that true.
    pub fn finish(&mut self, stopped: bool) -> bool {
        if self
            .finished_once
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Batch finish called again; ignoring");
            return false;
        }
        self.phase = BatchPhase::Finished;
        self.current_job_id = None;
        info!(stopped, "Batch finished");
        true
    }

    /// Track the job being dispatched.
    pub fn begin_job(&mut self, id: impl Into<String>) {
        self.current_job_id = Some(id.into());
    }

    /// Clear job tracking once a terminal outcome was recorded.
    pub fn end_job(&mut self) {
        self.current_job_id = None;
    }

    pub fn phase(&self) -> BatchPhase {
        self.phase
    }

    pub fn strategy(&self) -> UploadStrategy {
        self.strategy
    }

    /// Running or Stopping; a stopping batch still owns the queue.
    pub fn is_active(&self) -> bool {
        matches!(self.phase, BatchPhase::Running | BatchPhase::Stopping)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn current_job_id(&self) -> Option<&str> {
        self.current_job_id.as_deref()
    }

    /// Token handed to executors; cancelled by `request_stop`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
