//! Core job data types.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::brief::CreativeBrief;
use crate::generation::OperationKind;

/// Maximum number of entries kept in an operation's progress trace.
pub const PROGRESS_TRACE_CAP: usize = 4;

/// Name of the mandatory single-scene video sub-task.
pub const TASK_VIDEO: &str = "video";

/// Name of the optional voice synthesis sub-task.
pub const TASK_VOICE: &str = "voice";

/// Unique job identifier (UUID v4).
pub type JobId = String;

/// Sub-task name for a rendered scene.
pub fn scene_task_name(index: u32) -> String {
    format!("scene:{}", index)
}

/// Whether a sub-task blocks job completion.
///
/// Everything except the voice track is mandatory: a job without voice is a
/// degraded but valid artifact, a job without video is nothing.
pub fn is_mandatory_task(name: &str) -> bool {
    name != TASK_VOICE
}

// ============================================================================
// Submission spec (frozen at submission)
// ============================================================================

/// Product facts supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductFacts {
    /// Product name.
    pub name: String,
    /// Short tagline (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
    /// Freeform product description.
    #[serde(default)]
    pub description: String,
    /// Selling points, one scene is planned per point for multi-scene jobs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selling_points: Vec<String>,
}

/// Kind of a caller-supplied media asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    VideoClip,
    Logo,
}

/// A media asset referenced by the production request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaAsset {
    /// Caller-assigned asset id.
    pub id: String,
    /// Asset location (URL or storage URI).
    pub uri: String,
    /// Asset kind.
    pub kind: MediaKind,
}

/// Output aspect ratio.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AspectRatio {
    /// 16:9
    Landscape,
    /// 9:16
    Portrait,
    /// 1:1
    Square,
}

impl AspectRatio {
    /// Returns the ratio as a generation-service parameter string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Square => "1:1",
        }
    }
}

/// Requested output format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputFormat {
    pub aspect: AspectRatio,
    /// Total artifact duration in seconds.
    pub duration_secs: u32,
}

/// Voice track selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceSelection {
    /// Voice id understood by the synthesis service.
    pub voice_id: String,
    /// ISO 639-1 language code.
    pub language: String,
}

/// A production request, frozen at submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSpec {
    pub product: ProductFacts,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaAsset>,
    pub format: OutputFormat,
    /// Optional voice track; absent means a silent artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceSelection>,
}

// ============================================================================
// Job lifecycle
// ============================================================================

/// Current status of a job.
///
/// State machine flow:
/// ```text
/// Pending -> Initiating -> Polling <-> QuotaWait
///                |            |            |
///                v            v            v
///              Failed      Completed    Failed
///
/// Failed -> Pending on manual retry.
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, waiting for admission.
    Pending,
    /// Admitted; synchronous setup (brief derivation, sub-task starts) running.
    Initiating,
    /// All mandatory sub-tasks started, awaiting remote completion.
    Polling,
    /// A quota-limited sub-task is backing off; the job is waiting, not failing.
    QuotaWait,
    /// Every mandatory sub-task produced a result (terminal).
    Completed,
    /// A mandatory sub-task failed or retries exhausted (terminal).
    Failed,
}

impl JobStatus {
    /// Returns true if no further automatic transition occurs.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Returns the status as a string (for filtering and display).
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Initiating => "initiating",
            JobStatus::Polling => "polling",
            JobStatus::QuotaWait => "quota_wait",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Phase of one remote operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationPhase {
    Running,
    Succeeded,
    Failed,
}

impl OperationPhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationPhase::Running)
    }
}

/// Opaque reference to a remote long-running operation plus poll bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationHandle {
    /// Token returned by the generation service.
    pub remote_ref: String,
    /// What the remote operation produces.
    pub kind: OperationKind,
    pub phase: OperationPhase,
    #[serde(default = "Utc::now")]
    pub started_at: DateTime<Utc>,
    /// Total poll calls made against this handle.
    pub poll_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_poll_at: Option<DateTime<Utc>>,
    /// Bounded ring of human-readable status notes, informational only.
    #[serde(default)]
    pub progress_trace: VecDeque<String>,
}

impl OperationHandle {
    pub fn new(remote_ref: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            remote_ref: remote_ref.into(),
            kind,
            phase: OperationPhase::Running,
            started_at: Utc::now(),
            poll_attempts: 0,
            last_poll_at: None,
            progress_trace: VecDeque::new(),
        }
    }

    /// Append a progress note, evicting the oldest past the cap.
    pub fn push_progress(&mut self, note: impl Into<String>) {
        if self.progress_trace.len() >= PROGRESS_TRACE_CAP {
            self.progress_trace.pop_front();
        }
        self.progress_trace.push_back(note.into());
    }

    /// Most recent progress note.
    pub fn latest_progress(&self) -> Option<&str> {
        self.progress_trace.back().map(String::as_str)
    }
}

/// Per-sub-task retry bookkeeping.
///
/// Transient and quota failures consume independent budgets; the backoff
/// policy owns the curves, these counters are the only mutable retry state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetryState {
    pub transient_attempts: u32,
    pub quota_attempts: u32,
    /// Earliest instant the next poll of this sub-task may run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Accumulated output of a job, populated incrementally as sub-tasks finish.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobResult {
    /// Composed video URL (single-scene jobs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    /// Per-scene media URLs (multi-scene jobs), keyed by scene index.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scene_urls: BTreeMap<u32, String>,
    /// Voice track URL, absent when the voice sub-task was skipped or degraded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_url: Option<String>,
}

impl JobResult {
    pub fn is_empty(&self) -> bool {
        self.video_url.is_none() && self.scene_urls.is_empty() && self.voice_url.is_none()
    }
}

/// One unit of production work tracked through its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// Unique identifier, assigned at submission, immutable.
    pub id: JobId,
    /// The frozen input.
    pub spec: JobSpec,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: JobStatus,
    /// Creative brief derived during initiation ("plan ready" precedes any
    /// scene completing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brief: Option<CreativeBrief>,
    /// Sub-task name -> remote operation handle; empty until tasks start.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub operation_handles: BTreeMap<String, OperationHandle>,
    #[serde(default)]
    pub result: JobResult,
    /// Last user-facing failure message, present only when status is Failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Sub-task name -> retry bookkeeping.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub retry_state: BTreeMap<String, RetryState>,
}

impl Job {
    /// Create a freshly submitted job.
    pub fn new(spec: JobSpec) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            spec,
            submitted_at: now,
            updated_at: now,
            status: JobStatus::Pending,
            brief: None,
            operation_handles: BTreeMap::new(),
            result: JobResult::default(),
            error: None,
            retry_state: BTreeMap::new(),
        }
    }

    pub fn handle(&self, task: &str) -> Option<&OperationHandle> {
        self.operation_handles.get(task)
    }

    /// True if any mandatory sub-task still has a non-terminal handle.
    pub fn has_nonterminal_mandatory(&self) -> bool {
        self.operation_handles
            .iter()
            .any(|(name, h)| is_mandatory_task(name) && !h.phase.is_terminal())
    }

    /// True when every mandatory sub-task succeeded (and at least one exists).
    pub fn mandatory_all_succeeded(&self) -> bool {
        let mut saw_mandatory = false;
        for (name, handle) in &self.operation_handles {
            if is_mandatory_task(name) {
                saw_mandatory = true;
                if handle.phase != OperationPhase::Succeeded {
                    return false;
                }
            }
        }
        saw_mandatory
    }

    /// Read-only projection for subscribers.
    pub fn view(&self) -> JobView {
        JobView {
            id: self.id.clone(),
            status: self.status,
            product_name: self.spec.product.name.clone(),
            aspect: self.spec.format.aspect,
            submitted_at: self.submitted_at,
            updated_at: self.updated_at,
            tasks: self
                .operation_handles
                .iter()
                .map(|(name, h)| TaskView {
                    name: name.clone(),
                    kind: h.kind,
                    phase: h.phase,
                    poll_attempts: h.poll_attempts,
                    latest_progress: h.latest_progress().map(String::from),
                })
                .collect(),
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

// ============================================================================
// Display projections
// ============================================================================

/// Per-sub-task slice of a [`JobView`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskView {
    pub name: String,
    pub kind: OperationKind,
    pub phase: OperationPhase,
    pub poll_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_progress: Option<String>,
}

/// Read-only projection of a job record for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobView {
    pub id: JobId,
    pub status: JobStatus,
    pub product_name: String,
    pub aspect: AspectRatio,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tasks: Vec<TaskView>,
    pub result: JobResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Store change notification delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job record changed; carries the fresh projection.
    Updated { job: JobView },
    /// A job was cancelled and removed.
    Removed { job_id: JobId },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> JobSpec {
        JobSpec {
            product: ProductFacts {
                name: "Solar Kettle".to_string(),
                tagline: Some("Boil anywhere".to_string()),
                description: "A portable solar-powered kettle.".to_string(),
                selling_points: vec![],
            },
            media: vec![],
            format: OutputFormat {
                aspect: AspectRatio::Landscape,
                duration_secs: 30,
            },
            voice: None,
        }
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(spec());
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.operation_handles.is_empty());
        assert!(job.result.is_empty());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_status_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Polling.is_terminal());
        assert!(!JobStatus::QuotaWait.is_terminal());
    }

    #[test]
    fn test_progress_trace_bounded() {
        let mut handle = OperationHandle::new("op-1", OperationKind::VideoGeneration);
        for i in 0..10 {
            handle.push_progress(format!("note {}", i));
        }
        assert_eq!(handle.progress_trace.len(), PROGRESS_TRACE_CAP);
        assert_eq!(handle.latest_progress(), Some("note 9"));
        assert_eq!(handle.progress_trace.front().map(String::as_str), Some("note 6"));
    }

    #[test]
    fn test_mandatory_task_naming() {
        assert!(is_mandatory_task(TASK_VIDEO));
        assert!(is_mandatory_task(&scene_task_name(2)));
        assert!(!is_mandatory_task(TASK_VOICE));
        assert_eq!(scene_task_name(3), "scene:3");
    }

    #[test]
    fn test_mandatory_completion_ignores_voice() {
        let mut job = Job::new(spec());
        let mut video = OperationHandle::new("op-v", OperationKind::VideoGeneration);
        video.phase = OperationPhase::Succeeded;
        job.operation_handles.insert(TASK_VIDEO.to_string(), video);

        let mut voice = OperationHandle::new("op-s", OperationKind::VoiceSynthesis);
        voice.phase = OperationPhase::Failed;
        job.operation_handles.insert(TASK_VOICE.to_string(), voice);

        assert!(job.mandatory_all_succeeded());
        assert!(!job.has_nonterminal_mandatory());
    }

    #[test]
    fn test_no_handles_is_not_complete() {
        let job = Job::new(spec());
        assert!(!job.mandatory_all_succeeded());
    }

    #[test]
    fn test_job_serialization_roundtrip() {
        let job = Job::new(spec());
        let json = serde_json::to_string(&job).unwrap();
        let parsed: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, job.id);
        assert_eq!(parsed.status, JobStatus::Pending);
    }
}
