//! In-memory FIFO queue of upload jobs.
//!
//! The queue is owned by the service task and mutated only there; callers
//! reach it through messages, so the struct itself carries no locking.

use std::collections::VecDeque;

use tracing::{debug, info};

use crate::error::{Result, UploadError};
use crate::job::{JobOutcome, JobStatus, UploadJob, UploadSpec};

#[derive(Debug, Default)]
pub struct UploadQueue {
    jobs: VecDeque<UploadJob>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `spec`, assign an id, and append. No I/O.
    ///
    /// Returns a snapshot of the stored job.
    pub fn enqueue(&mut self, spec: UploadSpec) -> Result<UploadJob> {
        let job = UploadJob::from_spec(spec)?;
        info!(job_id = %job.id, title = %job.title, "Enqueued upload job");
        self.jobs.push_back(job.clone());
        Ok(job)
    }

    /// Remove a job by id. Returns false when the id is absent; refuses to
    /// remove the job that is currently Processing (callers must wait for a
    /// terminal state).
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let Some(idx) = self.jobs.iter().position(|j| j.id == id) else {
            return Ok(false);
        };
        if self.jobs[idx].status == JobStatus::Processing {
            return Err(UploadError::JobProcessing { id: id.to_owned() });
        }
        self.jobs.remove(idx);
        debug!(job_id = %id, "Removed job from queue");
        Ok(true)
    }

    /// All jobs except the one currently Processing, in FIFO order.
    pub fn waiting(&self) -> Vec<UploadJob> {
        self.jobs
            .iter()
            .filter(|j| j.status != JobStatus::Processing)
            .cloned()
            .collect()
    }

    /// Drop every queued job. Guarding against a running batch is the
    /// service's responsibility, not the queue's.
    pub fn clear(&mut self) -> usize {
        let dropped = self.jobs.len();
        self.jobs.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&UploadJob> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Id of the first Pending job in FIFO order.
    pub(crate) fn next_pending_id(&self) -> Option<String> {
        self.jobs
            .iter()
            .find(|j| j.status == JobStatus::Pending)
            .map(|j| j.id.clone())
    }

    /// Move a Pending job to Processing and return a snapshot for dispatch.
    pub(crate) fn mark_processing(&mut self, id: &str) -> Result<UploadJob> {
        let job = self.get_mut(id)?;
        job.transition(JobStatus::Processing)?;
        Ok(job.clone())
    }

    /// Record the terminal outcome of a Processing job and return the final
    /// snapshot. The outcome decides whether the job ends Completed or
    /// Failed; this is the only place a result is attached.
    pub(crate) fn finish_job(&mut self, id: &str, outcome: JobOutcome) -> Result<UploadJob> {
        let job = self.get_mut(id)?;
        let status = if outcome.is_success() {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        job.transition(status)?;
        job.outcome = Some(outcome);
        Ok(job.clone())
    }

    /// Remove a job that already reached a terminal state. Used by the
    /// draining loop after the completion has been acknowledged.
    pub(crate) fn remove_terminal(&mut self, id: &str) -> bool {
        let Some(idx) = self.jobs.iter().position(|j| j.id == id) else {
            return false;
        };
        if !self.jobs[idx].is_terminal() {
            return false;
        }
        self.jobs.remove(idx);
        true
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut UploadJob> {
        self.jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| UploadError::JobNotFound { id: id.to_owned() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadError;

    fn spec(n: u32) -> UploadSpec {
        UploadSpec::new(format!("/tmp/video-{n}.mp4"), format!("video {n}"))
    }

    #[test]
    fn enqueue_keeps_fifo_order() {
        let mut q = UploadQueue::new();
        let a = q.enqueue(spec(1)).unwrap();
        let b = q.enqueue(spec(2)).unwrap();
        let c = q.enqueue(spec(3)).unwrap();

        let ids: Vec<_> = q.waiting().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }

    #[test]
    fn waiting_excludes_the_processing_job() {
        let mut q = UploadQueue::new();
        let a = q.enqueue(spec(1)).unwrap();
        let b = q.enqueue(spec(2)).unwrap();
        q.mark_processing(&a.id).unwrap();

        let waiting = q.waiting();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id, b.id);
        // The processing job is still in the queue, just not waiting.
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn remove_of_absent_id_returns_false_and_leaves_queue_unchanged() {
        let mut q = UploadQueue::new();
        q.enqueue(spec(1)).unwrap();
        let before: Vec<_> = q.waiting().into_iter().map(|j| j.id).collect();

        assert!(!q.remove("no-such-id").unwrap());
        let after: Vec<_> = q.waiting().into_iter().map(|j| j.id).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn remove_of_processing_job_is_refused() {
        let mut q = UploadQueue::new();
        let a = q.enqueue(spec(1)).unwrap();
        q.mark_processing(&a.id).unwrap();

        let err = q.remove(&a.id).unwrap_err();
        assert!(matches!(err, UploadError::JobProcessing { .. }));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn remove_of_pending_job_succeeds() {
        let mut q = UploadQueue::new();
        let a = q.enqueue(spec(1)).unwrap();
        assert!(q.remove(&a.id).unwrap());
        assert!(q.is_empty());
    }

    #[test]
    fn finish_job_attaches_outcome_and_terminal_status() {
        let mut q = UploadQueue::new();
        let a = q.enqueue(spec(1)).unwrap();
        q.mark_processing(&a.id).unwrap();

        let done = q
            .finish_job(
                &a.id,
                JobOutcome::Succeeded {
                    remote_id: "vid123".into(),
                },
            )
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.outcome.unwrap().remote_id(), Some("vid123"));
    }

    #[test]
    fn failed_outcome_marks_job_failed() {
        let mut q = UploadQueue::new();
        let a = q.enqueue(spec(1)).unwrap();
        q.mark_processing(&a.id).unwrap();

        let done = q
            .finish_job(
                &a.id,
                JobOutcome::Failed {
                    error: UploadError::quota("limit"),
                },
            )
            .unwrap();
        assert_eq!(done.status, JobStatus::Failed);
    }

    #[test]
    fn remove_terminal_only_removes_finished_jobs() {
        let mut q = UploadQueue::new();
        let a = q.enqueue(spec(1)).unwrap();
        assert!(!q.remove_terminal(&a.id));

        q.mark_processing(&a.id).unwrap();
        assert!(!q.remove_terminal(&a.id));

        q.finish_job(
            &a.id,
            JobOutcome::Succeeded {
                remote_id: "v".into(),
            },
        )
        .unwrap();
        assert!(q.remove_terminal(&a.id));
        assert!(q.is_empty());
    }

    #[test]
    fn next_pending_skips_processing_jobs() {
        let mut q = UploadQueue::new();
        let a = q.enqueue(spec(1)).unwrap();
        let b = q.enqueue(spec(2)).unwrap();
        assert_eq!(q.next_pending_id().as_deref(), Some(a.id.as_str()));

        q.mark_processing(&a.id).unwrap();
        assert_eq!(q.next_pending_id().as_deref(), Some(b.id.as_str()));
    }

    #[test]
    fn clear_empties_the_queue() {
        let mut q = UploadQueue::new();
        q.enqueue(spec(1)).unwrap();
        q.enqueue(spec(2)).unwrap();
        assert_eq!(q.clear(), 2);
        assert!(q.is_empty());
    }
}
