//! Queue-driven upload engine for publishing media to a remote service.
//!
//! Jobs are enqueued, then drained one at a time by a batch running a
//! chosen strategy: a resumable chunked transfer against the HTTP API, or
//! a scripted browser session where the API path is not available.
//! Progress and results surface on a broadcast event stream.

pub mod automation;
pub mod batch;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod executor;
pub mod job;
pub mod post_upload;
pub mod progress;
pub mod queue;
pub mod retry;
pub mod service;
pub mod transport;

pub use batch::{BatchPhase, UploadStrategy};
pub use config::UplinkConfig;
pub use error::{Result, UploadError};
pub use events::{EventSink, UploadEvent};
pub use job::{JobStatus, UploadJob, UploadSpec};
pub use service::{UploadService, UploadServiceHandle};
