//! Credential collaborator consumed by the transport path.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

use crate::error::{Result, UploadError};

/// Supplies the bearer credential for API requests and lets the transport
/// executor invalidate it when the remote side reports expiry, so the owning
/// application re-authenticates before the next run instead of hammering the
/// API with a dead token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Current bearer token.
    async fn bearer_token(&self) -> Result<String>;

    /// Drop the cached credential. Subsequent `bearer_token` calls must not
    /// return the invalidated value.
    async fn invalidate(&self);
}

/// Holds one token in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct StaticTokenStore {
    token: RwLock<Option<String>>,
}

impl StaticTokenStore {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.token.read().is_some()
    }
}

#[async_trait]
impl CredentialStore for StaticTokenStore {
    async fn bearer_token(&self) -> Result<String> {
        self.token
            .read()
            .clone()
            .ok_or_else(|| UploadError::auth_expired("no credential available"))
    }

    async fn invalidate(&self) {
        warn!("Invalidating cached credential");
        *self.token.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalidate_drops_the_token() {
        let store = StaticTokenStore::new("tok-1");
        assert_eq!(store.bearer_token().await.unwrap(), "tok-1");
        assert!(store.is_valid());

        store.invalidate().await;
        assert!(!store.is_valid());
        let err = store.bearer_token().await.unwrap_err();
        assert!(matches!(err, UploadError::AuthExpired { .. }));
    }
}
