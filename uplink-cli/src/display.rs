//! Renders the engine's event stream as per-job progress bars.

use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::broadcast;
use tracing::debug;
use uplink_engine::events::UploadEvent;

/// Tally of one drained batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub completed: usize,
    pub failed: usize,
    pub stopped: bool,
}

impl BatchOutcome {
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 || self.stopped { 1 } else { 0 }
    }
}

/// Consume events until the batch finishes, drawing one bar per job.
pub async fn render_events(mut events: broadcast::Receiver<UploadEvent>) -> BatchOutcome {
    let bars = MultiProgress::new();
    let style = ProgressStyle::with_template("{msg:32!} [{bar:40.cyan/blue}] {pos:>3}%")
        .expect("static progress template")
        .progress_chars("##-");
    let mut jobs: HashMap<String, ProgressBar> = HashMap::new();
    let mut outcome = BatchOutcome::default();

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                debug!(missed, "event stream lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            UploadEvent::JobStarted { job_id, title } => {
                let bar = bars.add(ProgressBar::new(100));
                bar.set_style(style.clone());
                bar.set_message(title);
                jobs.insert(job_id, bar);
            }
            UploadEvent::JobProgress { job_id, percent } => {
                if let Some(bar) = jobs.get(&job_id) {
                    bar.set_position(u64::from(percent));
                }
            }
            UploadEvent::Log { message } => {
                let _ = bars.println(message);
            }
            UploadEvent::JobCompleted {
                job_id,
                success,
                remote_id,
                error,
            } => {
                if let Some(bar) = jobs.remove(&job_id) {
                    if success {
                        let id = remote_id.unwrap_or_default();
                        bar.finish_with_message(format!("done ({id})"));
                    } else {
                        let reason = error
                            .map(|err| err.to_string())
                            .unwrap_or_else(|| "unknown error".to_owned());
                        bar.abandon_with_message(format!("failed: {reason}"));
                    }
                }
                if success {
                    outcome.completed += 1;
                } else {
                    outcome.failed += 1;
                }
            }
            UploadEvent::BatchFinished { stopped } => {
                outcome.stopped = stopped;
                break;
            }
        }
    }
    outcome
}
