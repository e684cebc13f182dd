//! Caller-facing notification surface.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::UploadError;

/// Broadcast capacity; slow subscribers lose the oldest events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications emitted by the service and the executors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UploadEvent {
    /// A job left the waiting set and was dispatched to an executor.
    JobStarted { job_id: String, title: String },
    /// Per-job progress in percent, monotonically non-decreasing.
    JobProgress { job_id: String, percent: u8 },
    /// Human-readable log line mirrored to subscribers.
    Log { message: String },
    /// Terminal result for one job, delivered exactly once per job.
    JobCompleted {
        job_id: String,
        success: bool,
        remote_id: Option<String>,
        error: Option<UploadError>,
    },
    /// The batch reached its terminal condition, delivered exactly once per
    /// batch. `stopped` distinguishes cancellation from queue exhaustion.
    BatchFinished { stopped: bool },
}

/// Cloneable event sender.
///
/// Sends are fire-and-forget over a broadcast channel: a dead, missing, or
/// lagging subscriber never blocks the sender, so batch advancement cannot
/// depend on a live caller.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<UploadEvent>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: UploadEvent) {
        let _ = self.tx.send(event);
    }

    /// Mirror a log line to subscribers.
    pub fn log(&self, message: impl Into<String>) {
        self.emit(UploadEvent::Log {
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_without_subscribers_does_not_fail() {
        let sink = EventSink::new();
        sink.log("nobody is listening");
        sink.emit(UploadEvent::BatchFinished { stopped: false });
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let sink = EventSink::new();
        let mut rx = sink.subscribe();
        sink.log("first");
        sink.log("second");

        match rx.recv().await.unwrap() {
            UploadEvent::Log { message } => assert_eq!(message, "first"),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            UploadEvent::Log { message } => assert_eq!(message, "second"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn completion_events_round_trip_through_json() {
        let event = UploadEvent::JobCompleted {
            job_id: "job-9".to_owned(),
            success: false,
            remote_id: None,
            error: Some(UploadError::action_failed(
                "click",
                "css:#publish-button",
                "element not interactable",
            )),
        };

        let json = serde_json::to_string(&event).unwrap();
        let back: UploadEvent = serde_json::from_str(&json).unwrap();
        match back {
            UploadEvent::JobCompleted {
                job_id,
                success,
                error: Some(UploadError::ActionFailed {
                    action, locator, ..
                }),
                ..
            } => {
                assert_eq!(job_id, "job-9");
                assert!(!success);
                assert_eq!(action, "click");
                assert_eq!(locator, "css:#publish-button");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
