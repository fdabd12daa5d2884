//! Credential provider and refresh mocks for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::generation::{CredentialProvider, CredentialRefresh, Credentials, RawFailure};

/// Provider returning a fixed credential snapshot.
pub struct StaticCredentialProvider {
    credentials: Credentials,
}

impl StaticCredentialProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credentials: Credentials::new(api_key),
        }
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn snapshot(&self) -> Credentials {
        self.credentials.clone()
    }
}

/// Refresh collaborator that records every notification it receives.
#[derive(Clone, Default)]
pub struct RecordingCredentialRefresh {
    notifications: Arc<RwLock<Vec<RawFailure>>>,
}

impl RecordingCredentialRefresh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of permanent-failure notifications received.
    pub async fn count(&self) -> usize {
        self.notifications.read().await.len()
    }

    /// The recorded failures, in arrival order.
    pub async fn notifications(&self) -> Vec<RawFailure> {
        self.notifications.read().await.clone()
    }
}

#[async_trait]
impl CredentialRefresh for RecordingCredentialRefresh {
    async fn on_permanent_failure(&self, failure: &RawFailure) {
        self.notifications.write().await.push(failure.clone());
    }
}
