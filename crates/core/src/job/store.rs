//! Job storage trait and the merge-based mutation interface.
//!
//! All mutation of a job record goes through [`JobStore::merge`]: the merge
//! function reads the record as it is at application time and returns a
//! [`JobPatch`], which the store applies while still holding the record's
//! lock. Reading a job, editing the copy, and writing it back wholesale is
//! not expressible through this interface: concurrent sibling updates from
//! independent poll loops would be lost.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::brief::CreativeBrief;
use crate::job::{Job, JobEvent, JobId, JobStatus, OperationHandle, RetryState};

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Job not found (removed or never submitted).
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// Operation is not valid for the job's current status.
    #[error("cannot {operation} job {id}: status is {status}")]
    InvalidStatus {
        id: JobId,
        status: &'static str,
        operation: &'static str,
    },
}

/// Boxed merge function, object-safe form used by the trait.
pub type MergeFn<'a> = Box<dyn FnOnce(&Job) -> JobPatch + Send + 'a>;

/// A partial update produced by a merge function.
///
/// Fields compose additively; anything left unset leaves the record
/// untouched. Built through the `with_*` methods.
#[derive(Debug, Default, Clone)]
pub struct JobPatch {
    status: Option<JobStatus>,
    error: Option<Option<String>>,
    brief: Option<CreativeBrief>,
    upsert_handles: Vec<(String, OperationHandle)>,
    set_video_url: Option<String>,
    set_scene_urls: Vec<(u32, String)>,
    set_voice_url: Option<String>,
    set_retry: Vec<(String, RetryState)>,
    reset_attempt_state: bool,
    fail_open_handles: bool,
}

impl JobPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    pub fn with_brief(mut self, brief: CreativeBrief) -> Self {
        self.brief = Some(brief);
        self
    }

    /// Insert or replace one sub-task's operation handle.
    pub fn upsert_handle(mut self, task: impl Into<String>, handle: OperationHandle) -> Self {
        self.upsert_handles.push((task.into(), handle));
        self
    }

    pub fn with_video_url(mut self, url: impl Into<String>) -> Self {
        self.set_video_url = Some(url.into());
        self
    }

    pub fn with_scene_url(mut self, index: u32, url: impl Into<String>) -> Self {
        self.set_scene_urls.push((index, url.into()));
        self
    }

    pub fn with_voice_url(mut self, url: impl Into<String>) -> Self {
        self.set_voice_url = Some(url.into());
        self
    }

    pub fn with_retry_state(mut self, task: impl Into<String>, state: RetryState) -> Self {
        self.set_retry.push((task.into(), state));
        self
    }

    /// Wipe handles, retry counters, result and error: the manual-retry
    /// reset that grants a fresh attempt budget.
    pub fn reset_for_retry(mut self) -> Self {
        self.reset_attempt_state = true;
        self
    }

    /// Mark every still-running handle as failed. Applied when a job fails
    /// so no non-terminal handle outlives a terminal status.
    pub fn fail_open_handles(mut self) -> Self {
        self.fail_open_handles = true;
        self
    }

    /// True when applying would change nothing. Empty patches are dropped by
    /// the store without touching the record or notifying subscribers, which
    /// is what makes re-applied terminal merges side-effect free.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.error.is_none()
            && self.brief.is_none()
            && self.upsert_handles.is_empty()
            && self.set_video_url.is_none()
            && self.set_scene_urls.is_empty()
            && self.set_voice_url.is_none()
            && self.set_retry.is_empty()
            && !self.reset_attempt_state
            && !self.fail_open_handles
    }

    /// Apply the patch to a record. Called by the store under its lock.
    pub(crate) fn apply(self, job: &mut Job, now: DateTime<Utc>) {
        if self.reset_attempt_state {
            job.operation_handles.clear();
            job.retry_state.clear();
            job.result = Default::default();
            job.error = None;
        }
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(error) = self.error {
            job.error = error;
        }
        if let Some(brief) = self.brief {
            job.brief = Some(brief);
        }
        for (task, handle) in self.upsert_handles {
            job.operation_handles.insert(task, handle);
        }
        if let Some(url) = self.set_video_url {
            job.result.video_url = Some(url);
        }
        for (index, url) in self.set_scene_urls {
            job.result.scene_urls.insert(index, url);
        }
        if let Some(url) = self.set_voice_url {
            job.result.voice_url = Some(url);
        }
        for (task, state) in self.set_retry {
            job.retry_state.insert(task, state);
        }
        if self.fail_open_handles {
            for handle in job.operation_handles.values_mut() {
                if !handle.phase.is_terminal() {
                    handle.phase = crate::job::OperationPhase::Failed;
                }
            }
        }
        job.updated_at = now;
    }
}

/// Filter for querying jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Filter by status.
    pub status: Option<JobStatus>,
    /// Maximum number of results.
    pub limit: usize,
    /// Offset for pagination.
    pub offset: usize,
}

impl JobFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for job storage backends.
///
/// The only implementation in-tree is in-memory; the trait keeps the seam a
/// persistent backend would plug into, layered on the same merge interface.
pub trait JobStore: Send + Sync {
    /// Track a freshly submitted job.
    fn insert(&self, job: Job);

    /// Get a job snapshot by id.
    fn get(&self, id: &str) -> Option<Job>;

    /// True if the job is still tracked.
    fn contains(&self, id: &str) -> bool;

    /// List jobs matching the filter, ordered by submission time.
    fn list(&self, filter: &JobFilter) -> Vec<Job>;

    /// Count jobs currently in the given status.
    fn count_status(&self, status: JobStatus) -> usize;

    /// Oldest job still in Pending (FIFO admission order).
    fn oldest_pending(&self) -> Option<Job>;

    /// Atomically apply a merge function to a job record.
    ///
    /// The function receives the current record; the returned patch is
    /// applied before any other merge on the same job can run. Returns the
    /// updated snapshot.
    fn merge(&self, id: &str, f: MergeFn<'_>) -> Result<Job, StoreError>;

    /// Remove a job entirely (caller cancellation only).
    fn remove(&self, id: &str) -> Result<Job, StoreError>;

    /// Subscribe to job change events.
    fn subscribe(&self) -> broadcast::Receiver<JobEvent>;
}

/// Generic convenience over the object-safe [`JobStore::merge`].
pub trait JobStoreExt: JobStore {
    /// `merge` without the explicit boxing at call sites.
    fn merge_with<F>(&self, id: &str, f: F) -> Result<Job, StoreError>
    where
        F: FnOnce(&Job) -> JobPatch + Send,
    {
        self.merge(id, Box::new(f))
    }
}

impl<T: JobStore + ?Sized> JobStoreExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::OperationKind;
    use crate::job::{AspectRatio, JobSpec, OutputFormat, ProductFacts};

    fn job() -> Job {
        Job::new(JobSpec {
            product: ProductFacts {
                name: "Widget".to_string(),
                tagline: None,
                description: "A widget.".to_string(),
                selling_points: vec![],
            },
            media: vec![],
            format: OutputFormat {
                aspect: AspectRatio::Square,
                duration_secs: 15,
            },
            voice: None,
        })
    }

    #[test]
    fn test_patch_apply_sets_status_and_error() {
        let mut j = job();
        let patch = JobPatch::new()
            .with_status(JobStatus::Failed)
            .with_error("it broke");
        patch.apply(&mut j, Utc::now());
        assert_eq!(j.status, JobStatus::Failed);
        assert_eq!(j.error.as_deref(), Some("it broke"));
    }

    #[test]
    fn test_patch_result_merge_is_additive() {
        let mut j = job();
        JobPatch::new()
            .with_scene_url(0, "https://cdn/scene0.mp4")
            .apply(&mut j, Utc::now());
        JobPatch::new()
            .with_scene_url(1, "https://cdn/scene1.mp4")
            .with_voice_url("https://cdn/voice.mp3")
            .apply(&mut j, Utc::now());

        assert_eq!(j.result.scene_urls.len(), 2);
        assert_eq!(j.result.voice_url.as_deref(), Some("https://cdn/voice.mp3"));
    }

    #[test]
    fn test_patch_reset_for_retry_clears_attempt_state() {
        let mut j = job();
        JobPatch::new()
            .upsert_handle(
                "video",
                OperationHandle::new("op-1", OperationKind::VideoGeneration),
            )
            .with_retry_state("video", RetryState {
                transient_attempts: 2,
                quota_attempts: 1,
                next_retry_at: None,
            })
            .with_status(JobStatus::Failed)
            .with_error("exhausted")
            .apply(&mut j, Utc::now());

        JobPatch::new()
            .reset_for_retry()
            .with_status(JobStatus::Pending)
            .apply(&mut j, Utc::now());

        assert_eq!(j.status, JobStatus::Pending);
        assert!(j.operation_handles.is_empty());
        assert!(j.retry_state.is_empty());
        assert!(j.result.is_empty());
        assert!(j.error.is_none());
    }

    #[test]
    fn test_patch_is_idempotent_for_terminal_results() {
        let mut a = job();
        let mut handle = OperationHandle::new("op-1", OperationKind::VideoGeneration);
        handle.phase = crate::job::OperationPhase::Succeeded;

        let terminal = JobPatch::new()
            .with_status(JobStatus::Completed)
            .with_video_url("https://cdn/final.mp4")
            .upsert_handle("video", handle);

        let now = Utc::now();
        terminal.clone().apply(&mut a, now);
        let mut b = a.clone();
        terminal.apply(&mut b, now);

        assert_eq!(a, b);
    }
}
