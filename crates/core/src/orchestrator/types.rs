//! Types for the production orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::brief::BriefError;
use crate::job::StoreError;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Job not found.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Invalid job status for the requested operation.
    #[error("invalid job status: expected {expected}, got {actual}")]
    InvalidStatus {
        expected: &'static str,
        actual: &'static str,
    },

    /// Job store error.
    #[error("job store error: {0}")]
    Store(#[from] StoreError),

    /// Brief derivation error.
    #[error("brief error: {0}")]
    Brief(#[from] BriefError),
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether the orchestrator is running.
    pub running: bool,
    /// Number of active poll loops.
    pub active_poll_loops: usize,
    /// Jobs waiting for admission.
    pub pending_count: usize,
    /// Jobs mid-setup (should be 0 or 1).
    pub initiating_count: usize,
    /// Jobs awaiting remote completion.
    pub polling_count: usize,
    /// Jobs waiting out a quota backoff.
    pub quota_wait_count: usize,
    /// Jobs finished successfully.
    pub completed_count: usize,
    /// Jobs failed.
    pub failed_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orchestrator_status_default() {
        let status = OrchestratorStatus::default();
        assert!(!status.running);
        assert_eq!(status.active_poll_loops, 0);
        assert_eq!(status.pending_count, 0);
    }

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::JobNotFound("job-456".to_string());
        assert_eq!(err.to_string(), "job not found: job-456");

        let err = OrchestratorError::InvalidStatus {
            expected: "failed",
            actual: "completed",
        };
        assert_eq!(
            err.to_string(),
            "invalid job status: expected failed, got completed"
        );
    }
}
