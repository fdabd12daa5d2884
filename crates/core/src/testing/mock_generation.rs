//! Mock generation client for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::generation::{
    GenerationClient, OperationKind, OperationOutput, OperationPoll, OperationRequest, RawFailure,
    StartedOperation,
};
use crate::job::OperationHandle;

/// One scripted poll observation.
#[derive(Debug, Clone)]
pub enum ScriptedPoll {
    /// Poll succeeds, operation still running.
    Running(Option<String>),
    /// Poll succeeds, operation finished with this media URL.
    Succeed(String),
    /// Poll succeeds, operation finished with a remote failure.
    FailRemote(RawFailure),
    /// The poll call itself fails.
    Fail(RawFailure),
}

/// A recorded start call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedStart {
    pub kind: OperationKind,
    pub request: OperationRequest,
    /// Remote ref assigned to the started operation.
    pub remote_ref: String,
    pub timestamp: DateTime<Utc>,
}

/// Mock implementation of the GenerationClient trait.
///
/// Provides controllable behavior for testing:
/// - Record start calls for assertions
/// - Script poll outcomes per operation, assigned by kind in start order
/// - Inject start failures
///
/// Operations with no script succeed on the first poll with a generated
/// URL; an exhausted script keeps reporting "running".
///
/// # Example
///
/// ```rust,ignore
/// let client = MockGenerationClient::new();
///
/// client.script_next(
///     OperationKind::VideoGeneration,
///     vec![
///         ScriptedPoll::Running(None),
///         ScriptedPoll::Succeed("https://cdn.mock/out.mp4".to_string()),
///     ],
/// ).await;
///
/// // First poll reports running, second completes.
/// ```
pub struct MockGenerationClient {
    starts: Arc<RwLock<Vec<RecordedStart>>>,
    start_failures: Arc<RwLock<HashMap<OperationKind, VecDeque<RawFailure>>>>,
    scripts_by_kind: Arc<RwLock<HashMap<OperationKind, VecDeque<Vec<ScriptedPoll>>>>>,
    op_scripts: Arc<RwLock<HashMap<String, VecDeque<ScriptedPoll>>>>,
    poll_counts: Arc<RwLock<HashMap<String, u32>>>,
    ref_counter: AtomicU32,
}

impl Default for MockGenerationClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerationClient {
    pub fn new() -> Self {
        Self {
            starts: Arc::new(RwLock::new(Vec::new())),
            start_failures: Arc::new(RwLock::new(HashMap::new())),
            scripts_by_kind: Arc::new(RwLock::new(HashMap::new())),
            op_scripts: Arc::new(RwLock::new(HashMap::new())),
            poll_counts: Arc::new(RwLock::new(HashMap::new())),
            ref_counter: AtomicU32::new(0),
        }
    }

    /// Script the poll outcomes for the next started operation of `kind`.
    pub async fn script_next(&self, kind: OperationKind, script: Vec<ScriptedPoll>) {
        self.scripts_by_kind
            .write()
            .await
            .entry(kind)
            .or_default()
            .push_back(script);
    }

    /// Make the next start call of `kind` fail with the given error.
    pub async fn fail_next_start(&self, kind: OperationKind, failure: RawFailure) {
        self.start_failures
            .write()
            .await
            .entry(kind)
            .or_default()
            .push_back(failure);
    }

    /// All recorded start calls.
    pub async fn started(&self) -> Vec<RecordedStart> {
        self.starts.read().await.clone()
    }

    /// Number of starts of the given kind.
    pub async fn start_count(&self, kind: OperationKind) -> usize {
        self.starts
            .read()
            .await
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }

    /// Remote ref of the nth started operation of `kind` (0-based).
    pub async fn remote_ref(&self, kind: OperationKind, index: usize) -> Option<String> {
        self.starts
            .read()
            .await
            .iter()
            .filter(|s| s.kind == kind)
            .nth(index)
            .map(|s| s.remote_ref.clone())
    }

    /// How many times an operation has been polled.
    pub async fn poll_count(&self, remote_ref: &str) -> u32 {
        self.poll_counts
            .read()
            .await
            .get(remote_ref)
            .copied()
            .unwrap_or(0)
    }

    /// Total polls across all operations.
    pub async fn total_polls(&self) -> u32 {
        self.poll_counts.read().await.values().sum()
    }
}

#[async_trait]
impl GenerationClient for MockGenerationClient {
    async fn start_operation(
        &self,
        kind: OperationKind,
        request: &OperationRequest,
    ) -> Result<StartedOperation, RawFailure> {
        if let Some(failure) = self
            .start_failures
            .write()
            .await
            .get_mut(&kind)
            .and_then(|q| q.pop_front())
        {
            return Err(failure);
        }

        let n = self.ref_counter.fetch_add(1, Ordering::SeqCst);
        let remote_ref = format!("mock-op-{}-{}", kind.as_str(), n);

        if let Some(script) = self
            .scripts_by_kind
            .write()
            .await
            .get_mut(&kind)
            .and_then(|q| q.pop_front())
        {
            self.op_scripts
                .write()
                .await
                .insert(remote_ref.clone(), script.into_iter().collect());
        }

        self.starts.write().await.push(RecordedStart {
            kind,
            request: request.clone(),
            remote_ref: remote_ref.clone(),
            timestamp: Utc::now(),
        });

        Ok(StartedOperation { remote_ref })
    }

    async fn poll_operation(&self, handle: &OperationHandle) -> Result<OperationPoll, RawFailure> {
        *self
            .poll_counts
            .write()
            .await
            .entry(handle.remote_ref.clone())
            .or_insert(0) += 1;

        let mut op_scripts = self.op_scripts.write().await;
        match op_scripts.get_mut(&handle.remote_ref) {
            // No script was ever assigned: succeed immediately.
            None => Ok(OperationPoll::succeeded(OperationOutput {
                media_url: format!("https://cdn.mock/{}.mp4", handle.remote_ref),
                mime_type: None,
            })),
            Some(script) => match script.pop_front() {
                // Script exhausted: keep running.
                None => Ok(OperationPoll::running(None)),
                Some(ScriptedPoll::Running(note)) => Ok(OperationPoll::running(note)),
                Some(ScriptedPoll::Succeed(url)) => Ok(OperationPoll::succeeded(OperationOutput {
                    media_url: url,
                    mime_type: None,
                })),
                Some(ScriptedPoll::FailRemote(raw)) => Ok(OperationPoll::failed(raw)),
                Some(ScriptedPoll::Fail(raw)) => Err(raw),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unscripted_operation_succeeds_on_first_poll() {
        let client = MockGenerationClient::new();
        let started = client
            .start_operation(
                OperationKind::VideoGeneration,
                &OperationRequest::video("test"),
            )
            .await
            .unwrap();

        let handle = OperationHandle::new(started.remote_ref.clone(), OperationKind::VideoGeneration);
        let poll = client.poll_operation(&handle).await.unwrap();
        assert!(poll.done);
        assert!(poll.output.unwrap().media_url.contains(&started.remote_ref));
        assert_eq!(client.poll_count(&started.remote_ref).await, 1);
    }

    #[tokio::test]
    async fn test_scripted_polls_play_in_order() {
        let client = MockGenerationClient::new();
        client
            .script_next(
                OperationKind::VideoGeneration,
                vec![
                    ScriptedPoll::Running(Some("warming up".to_string())),
                    ScriptedPoll::Succeed("https://cdn.mock/done.mp4".to_string()),
                ],
            )
            .await;

        let started = client
            .start_operation(
                OperationKind::VideoGeneration,
                &OperationRequest::video("test"),
            )
            .await
            .unwrap();
        let handle = OperationHandle::new(started.remote_ref, OperationKind::VideoGeneration);

        let first = client.poll_operation(&handle).await.unwrap();
        assert!(!first.done);
        assert_eq!(first.progress_note.as_deref(), Some("warming up"));

        let second = client.poll_operation(&handle).await.unwrap();
        assert!(second.done);
        assert_eq!(second.output.unwrap().media_url, "https://cdn.mock/done.mp4");
    }

    #[tokio::test]
    async fn test_injected_start_failure() {
        let client = MockGenerationClient::new();
        client
            .fail_next_start(
                OperationKind::VoiceSynthesis,
                RawFailure::http(404, "voice not found"),
            )
            .await;

        let result = client
            .start_operation(
                OperationKind::VoiceSynthesis,
                &OperationRequest::voice("hi", "v", "en"),
            )
            .await;
        assert!(result.is_err());

        // The next start succeeds again.
        let result = client
            .start_operation(
                OperationKind::VoiceSynthesis,
                &OperationRequest::voice("hi", "v", "en"),
            )
            .await;
        assert!(result.is_ok());
    }
}
