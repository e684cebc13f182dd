//! The service task: sole owner of the queue and the batch state.
//!
//! Jobs run on spawned worker tasks, but every state transition happens
//! here, on one task, in response to either a command or a worker
//! finishing. Commands already sitting in the mailbox are applied before
//! the next job is dispatched, so a stop that arrives right after a start
//! is honored without running anything.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use crate::automation::AutomationDriver;
use crate::batch::{BatchPhase, BatchState, UploadStrategy};
use crate::config::UplinkConfig;
use crate::credentials::CredentialStore;
use crate::error::{Result, UploadError};
use crate::events::{EventSink, UploadEvent};
use crate::executor::{AutomationExecutor, ExecContext, TransportExecutor, UploadExecutor};
use crate::job::JobOutcome;
use crate::post_upload::{PlaylistCache, PostUploadPipeline};
use crate::progress::ProgressReporter;
use crate::queue::UploadQueue;
use crate::transport::UploadTransport;

use super::handle::UploadServiceHandle;
use super::messages::ServiceCommand;

/// Command mailbox capacity.
pub const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// The job currently running on a worker task.
struct InflightJob {
    job_id: String,
    handle: JoinHandle<Result<String>>,
}

/// Owns all mutable upload state and drains the queue one job at a time.
pub struct UploadService {
    commands: mpsc::Receiver<ServiceCommand>,
    queue: UploadQueue,
    batch: BatchState,
    events: EventSink,
    config: UplinkConfig,
    transport_exec: Arc<dyn UploadExecutor>,
    automation_exec: Arc<dyn UploadExecutor>,
    pipeline: Arc<PostUploadPipeline>,
    /// Playlist lookups resolved once per batch, shared across its jobs.
    playlist_cache: Arc<PlaylistCache>,
}

impl UploadService {
    /// Wire up the executors, spawn the service task, and hand back the
    /// client side.
    pub fn spawn(
        config: UplinkConfig,
        transport: Arc<dyn UploadTransport>,
        driver: Arc<dyn AutomationDriver>,
        credentials: Arc<dyn CredentialStore>,
    ) -> UploadServiceHandle {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let events = EventSink::new();

        let transport_exec: Arc<dyn UploadExecutor> = Arc::new(TransportExecutor::new(
            transport.clone(),
            credentials,
            config.retry.chunk_retry.clone(),
        ));
        let automation_exec: Arc<dyn UploadExecutor> =
            Arc::new(AutomationExecutor::new(driver, config.automation.clone()));
        let pipeline = Arc::new(PostUploadPipeline::new(
            transport,
            config.retry.request_backoff.clone(),
        ));

        let service = UploadService {
            commands: commands_rx,
            queue: UploadQueue::new(),
            batch: BatchState::new(),
            events: events.clone(),
            config,
            transport_exec,
            automation_exec,
            pipeline,
            playlist_cache: Arc::new(PlaylistCache::new()),
        };
        tokio::spawn(service.run());

        UploadServiceHandle::new(commands_tx, events)
    }

    pub(crate) async fn run(mut self) {
        info!("Upload service started");
        let mut inflight: Option<InflightJob> = None;
        let mut closed = false;
        let mut shutdown = false;

        loop {
            // Apply every command already queued before dispatching.
            while !closed && !shutdown {
                match self.commands.try_recv() {
                    Ok(command) => shutdown = self.handle_command(command),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => closed = true,
                }
            }
            if shutdown {
                break;
            }

            if inflight.is_none() && self.batch.is_active() {
                self.advance(&mut inflight);
            }

            // Every handle dropped and nothing left to drive.
            if closed && inflight.is_none() {
                break;
            }

            tokio::select! {
                biased;
                joined = join_inflight(&mut inflight) => {
                    if let Some(InflightJob { job_id, .. }) = inflight.take() {
                        self.complete_job(job_id, joined);
                    }
                }
                command = self.commands.recv(), if !closed => {
                    match command {
                        Some(command) => shutdown = self.handle_command(command),
                        None => closed = true,
                    }
                }
            }
            if shutdown {
                break;
            }
        }

        // Drain the in-flight worker so completion bookkeeping still runs.
        if let Some(InflightJob { job_id, handle }) = inflight.take() {
            self.batch.cancellation_token().cancel();
            let joined = handle.await;
            self.complete_job(job_id, joined);
        }
        if self.batch.is_active() {
            self.finish_batch(true);
        }
        info!("Upload service stopped");
    }

    /// Returns true when the service should shut down.
    fn handle_command(&mut self, command: ServiceCommand) -> bool {
        match command {
            ServiceCommand::Enqueue { spec, reply } => {
                let _ = reply.send(self.queue.enqueue(spec));
            }
            ServiceCommand::Remove { id, reply } => {
                let _ = reply.send(self.queue.remove(&id));
            }
            ServiceCommand::ListWaiting { reply } => {
                let _ = reply.send(self.queue.waiting());
            }
            ServiceCommand::ClearQueue { reply } => {
                assert!(
                    !self.batch.is_active(),
                    "clear_queue called while a batch is active"
                );
                let _ = reply.send(self.queue.clear());
            }
            ServiceCommand::StartBatch { strategy, reply } => {
                let _ = reply.send(self.start_batch(strategy));
            }
            ServiceCommand::RequestStop { reply } => {
                let _ = reply.send(self.batch.request_stop());
            }
            ServiceCommand::Shutdown => {
                info!("Shutdown requested");
                return true;
            }
        }
        false
    }

    fn start_batch(&mut self, strategy: UploadStrategy) -> Result<()> {
        if self.batch.is_active() {
            return Err(UploadError::invalid_transition(
                self.batch.phase().to_string(),
                BatchPhase::Running.to_string(),
            ));
        }
        let Some(first) = self.queue.next_pending_id() else {
            return Err(UploadError::validation(
                "cannot start a batch with an empty queue",
            ));
        };
        self.batch.start(strategy, first)?;
        self.playlist_cache = Arc::new(PlaylistCache::new());
        Ok(())
    }

    /// Dispatch the next pending job, or finish the batch when there is
    /// nothing left to run. Called only while no job is in flight.
    fn advance(&mut self, inflight: &mut Option<InflightJob>) {
        if self.batch.is_stop_requested() {
            self.finish_batch(true);
            return;
        }
        let Some(id) = self.queue.next_pending_id() else {
            self.finish_batch(false);
            return;
        };
        let job = match self.queue.mark_processing(&id) {
            Ok(job) => job,
            Err(err) => {
                warn!(job_id = %id, error = %err, "Could not dispatch the next job");
                self.finish_batch(false);
                return;
            }
        };
        self.batch.begin_job(&id);
        self.events.emit(UploadEvent::JobStarted {
            job_id: id.clone(),
            title: job.title.clone(),
        });
        info!(job_id = %id, title = %job.title, strategy = %self.batch.strategy(), "Dispatching job");

        let executor = self.executor_for(self.batch.strategy());
        let pipeline = self.pipeline.clone();
        let cache = self.playlist_cache.clone();
        let ctx = ExecContext::new(
            self.batch.cancellation_token(),
            ProgressReporter::new(&id, self.events.clone()),
            self.events.clone(),
        );
        let handle = tokio::spawn(async move {
            let result = executor.execute(&job, &ctx).await;
            if let Ok(remote_id) = &result {
                pipeline.run(&job, remote_id, &cache, &ctx).await;
            }
            result
        });
        *inflight = Some(InflightJob { job_id: id, handle });
    }

    /// Record a worker's terminal result and advance the batch bookkeeping.
    fn complete_job(
        &mut self,
        job_id: String,
        joined: std::result::Result<Result<String>, JoinError>,
    ) {
        let outcome = match joined {
            Ok(result) => result,
            Err(err) => Err(UploadError::protocol(format!("upload task failed: {err}"))),
        };

        let recorded = match &outcome {
            Ok(remote_id) => JobOutcome::Succeeded {
                remote_id: remote_id.clone(),
            },
            Err(err) => JobOutcome::Failed { error: err.clone() },
        };
        if let Err(err) = self.queue.finish_job(&job_id, recorded) {
            warn!(job_id = %job_id, error = %err, "Could not record the job outcome");
        }

        match &outcome {
            Ok(remote_id) => info!(job_id = %job_id, remote_id = %remote_id, "Job completed"),
            Err(err) => warn!(job_id = %job_id, error = %err, "Job failed"),
        }
        let (success, remote_id, error) = match &outcome {
            Ok(remote_id) => (true, Some(remote_id.clone()), None),
            Err(err) => (false, None, Some(err.clone())),
        };
        self.events.emit(UploadEvent::JobCompleted {
            job_id: job_id.clone(),
            success,
            remote_id,
            error,
        });

        self.queue.remove_terminal(&job_id);
        self.batch.end_job();

        if let Err(err) = &outcome {
            if err.halts_batch() && self.config.halt_on_session_loss {
                warn!("Automation session unavailable; ending the batch");
                self.finish_batch(true);
            }
        }
    }

    fn finish_batch(&mut self, stopped: bool) {
        if self.batch.finish(stopped) {
            self.events.emit(UploadEvent::BatchFinished { stopped });
        }
    }

    fn executor_for(&self, strategy: UploadStrategy) -> Arc<dyn UploadExecutor> {
        match strategy {
            UploadStrategy::Transport => self.transport_exec.clone(),
            UploadStrategy::Automation => self.automation_exec.clone(),
        }
    }
}

/// Await the in-flight worker, or park forever when there is none so the
/// select arm stays quiet.
async fn join_inflight(
    inflight: &mut Option<InflightJob>,
) -> std::result::Result<Result<String>, JoinError> {
    match inflight.as_mut() {
        Some(running) => (&mut running.handle).await,
        None => std::future::pending().await,
    }
}
