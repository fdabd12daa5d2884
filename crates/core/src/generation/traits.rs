//! Generation service abstraction.

use async_trait::async_trait;

use crate::job::OperationHandle;

use super::{Credentials, OperationKind, OperationPoll, OperationRequest, RawFailure, StartedOperation};

/// The remote generation capability the orchestrator depends on.
///
/// Implementations must read credentials fresh on every call (see
/// [`CredentialProvider`]): a retry after a credential rotation has to pick
/// up the new key without the orchestrator being rebuilt.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Start a long-running operation of the given kind.
    async fn start_operation(
        &self,
        kind: OperationKind,
        request: &OperationRequest,
    ) -> Result<StartedOperation, RawFailure>;

    /// Poll an outstanding operation once.
    async fn poll_operation(&self, handle: &OperationHandle) -> Result<OperationPoll, RawFailure>;
}

/// Source of the current credential snapshot.
///
/// Called at the top of every remote call, never cached across calls.
pub trait CredentialProvider: Send + Sync {
    fn snapshot(&self) -> Credentials;
}

/// One-way collaborator notified when a failure classifies as permanent,
/// giving it a chance to prompt for new credentials. The orchestrator never
/// waits on it; the failing job fails regardless.
#[async_trait]
pub trait CredentialRefresh: Send + Sync {
    async fn on_permanent_failure(&self, failure: &RawFailure);
}

/// Provider that re-reads an environment variable on every snapshot, so a
/// rotated key is picked up by the next remote call.
pub struct EnvCredentialProvider {
    env_var: String,
    fallback: String,
}

impl EnvCredentialProvider {
    pub fn new(env_var: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            env_var: env_var.into(),
            fallback: fallback.into(),
        }
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn snapshot(&self) -> Credentials {
        let api_key = std::env::var(&self.env_var).unwrap_or_else(|_| self.fallback.clone());
        Credentials::new(api_key)
    }
}

/// Default refresh collaborator: logs the condition for the operator.
pub struct LoggingCredentialRefresh;

#[async_trait]
impl CredentialRefresh for LoggingCredentialRefresh {
    async fn on_permanent_failure(&self, failure: &RawFailure) {
        tracing::warn!(
            "Permanent generation failure, credentials may need refreshing: {}",
            failure
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_provider_falls_back() {
        let provider =
            EnvCredentialProvider::new("SPOTNIK_TEST_KEY_THAT_IS_UNSET", "fallback-key");
        assert_eq!(provider.snapshot().api_key, "fallback-key");
    }
}
