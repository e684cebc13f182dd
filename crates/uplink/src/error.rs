use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, UploadError>;

/// Classified upload failure.
///
/// Stored on terminal jobs and carried inside broadcast events, so every
/// variant owns plain data instead of wrapping collaborator error types.
/// The retry drivers and the batch loop consume the classification
/// methods below rather than matching on concrete variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum UploadError {
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    #[error("source file missing: `{path}`")]
    SourceMissing { path: String },

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("job `{id}` is currently processing")]
    JobProcessing { id: String },

    #[error("job not found: `{id}`")]
    JobNotFound { id: String },

    #[error("transient network error: {reason}")]
    NetworkTransient { reason: String },

    #[error("quota exceeded: {reason}")]
    QuotaExceeded { reason: String },

    #[error("authentication expired: {reason}")]
    AuthExpired { reason: String },

    #[error("remote rejected the request with HTTP {status}: {reason}")]
    RemoteRejected { status: u16, reason: String },

    #[error("automation session unavailable after {attempts} attempts: {reason}")]
    SessionUnavailable { attempts: u32, reason: String },

    #[error("element not found: `{locator}`")]
    ElementNotFound { locator: String },

    #[error("automation action `{action}` failed on `{locator}`: {reason}")]
    ActionFailed {
        action: String,
        locator: String,
        reason: String,
    },

    #[error("stale element: `{locator}`")]
    StaleElement { locator: String },

    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {reason}")]
    Io { reason: String },

    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    #[error("upload service stopped")]
    ServiceStopped,
}

impl UploadError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn source_missing(path: impl Into<String>) -> Self {
        Self::SourceMissing { path: path.into() }
    }

    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn network(reason: impl Into<String>) -> Self {
        Self::NetworkTransient {
            reason: reason.into(),
        }
    }

    pub fn quota(reason: impl Into<String>) -> Self {
        Self::QuotaExceeded {
            reason: reason.into(),
        }
    }

    pub fn auth_expired(reason: impl Into<String>) -> Self {
        Self::AuthExpired {
            reason: reason.into(),
        }
    }

    pub fn rejected(status: u16, reason: impl Into<String>) -> Self {
        Self::RemoteRejected {
            status,
            reason: reason.into(),
        }
    }

    pub fn session_unavailable(attempts: u32, reason: impl Into<String>) -> Self {
        Self::SessionUnavailable {
            attempts,
            reason: reason.into(),
        }
    }

    pub fn element_not_found(locator: impl Into<String>) -> Self {
        Self::ElementNotFound {
            locator: locator.into(),
        }
    }

    pub fn action_failed(
        action: impl Into<String>,
        locator: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ActionFailed {
            action: action.into(),
            locator: locator.into(),
            reason: reason.into(),
        }
    }

    pub fn stale(locator: impl Into<String>) -> Self {
        Self::StaleElement {
            locator: locator.into(),
        }
    }

    pub fn io(err: &std::io::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Whether a retry driver may attempt this operation again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkTransient { .. })
    }

    /// Stale elements restart the whole locate-and-act primitive instead of
    /// propagating, up to the primitive's retry limit.
    pub fn is_stale_element(&self) -> bool {
        matches!(self, Self::StaleElement { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Failures of the shared automation resource poison every job that
    /// would follow in the same batch; the batch loop consults this together
    /// with `halt_on_session_loss`.
    pub fn halts_batch(&self) -> bool {
        matches!(self, Self::SessionUnavailable { .. })
    }
}
