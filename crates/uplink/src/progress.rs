//! Per-job progress reporting.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::events::{EventSink, UploadEvent};

/// Reports percent progress for a single job, enforcing the monotonic
/// contract: a value at or below the high-water mark is silently dropped, so
/// subscribers only ever observe a non-decreasing sequence even across chunk
/// retries.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    job_id: String,
    high_water: Arc<AtomicU8>,
    sink: Option<EventSink>,
}

impl ProgressReporter {
    pub fn new(job_id: impl Into<String>, sink: EventSink) -> Self {
        Self {
            job_id: job_id.into(),
            high_water: Arc::new(AtomicU8::new(0)),
            sink: Some(sink),
        }
    }

    /// Reporter that swallows everything. Handy for tests and detached runs.
    pub fn noop() -> Self {
        Self {
            job_id: String::new(),
            high_water: Arc::new(AtomicU8::new(0)),
            sink: None,
        }
    }

    /// Record `percent` (clamped to 100) and emit it if it advances the
    /// high-water mark.
    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        let prev = self.high_water.fetch_max(percent, Ordering::AcqRel);
        if percent <= prev {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.emit(UploadEvent::JobProgress {
                job_id: self.job_id.clone(),
                percent,
            });
        }
    }

    /// Highest percent reported so far.
    pub fn last(&self) -> u8 {
        self.high_water.load(Ordering::Acquire)
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}
