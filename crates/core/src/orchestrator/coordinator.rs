//! Asset generation coordinator.
//!
//! Scatter-gather start of a job's sub-tasks: every task is launched
//! concurrently, handles merge into the job record as they come back, and
//! the mandatory/optional asymmetry decides what an immediate start failure
//! means for the job.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::brief::CreativeBrief;
use crate::generation::{
    CredentialRefresh, GenerationClient, OperationKind, OperationRequest, RawFailure,
};
use crate::job::{
    scene_task_name, JobPatch, JobStatus, JobStore, JobStoreExt, OperationHandle, RetryState,
    StoreError, TASK_VIDEO, TASK_VOICE,
};
use crate::metrics;
use crate::retry::{classify, BackoffDecision, BackoffPolicy, FailureClass};

/// One named sub-task to start for a job.
#[derive(Debug, Clone)]
pub struct SubTask {
    pub name: String,
    pub kind: OperationKind,
    /// Mandatory tasks gate completion; optional tasks degrade on failure.
    pub mandatory: bool,
    pub request: OperationRequest,
}

/// Human-readable label for failure messages.
pub(crate) fn task_label(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::VideoGeneration => "video generation",
        OperationKind::VoiceSynthesis => "voice synthesis",
    }
}

/// Map a job's brief onto the sub-tasks to start.
///
/// Single-scene jobs get one mandatory "video" task; multi-scene jobs get
/// one mandatory task per scene. A selected voice adds the optional "voice"
/// task.
pub fn plan_sub_tasks(spec: &crate::job::JobSpec, brief: &CreativeBrief) -> Vec<SubTask> {
    let media_by_id = |ids: &[String]| -> Vec<String> {
        spec.media
            .iter()
            .filter(|m| ids.contains(&m.id))
            .map(|m| m.uri.clone())
            .collect()
    };

    let mut tasks = Vec::with_capacity(brief.scenes.len() + 1);

    for scene in &brief.scenes {
        let name = if brief.is_multi_scene() {
            scene_task_name(scene.index)
        } else {
            TASK_VIDEO.to_string()
        };
        let request = OperationRequest::video(scene.prompt.clone())
            .with_media(media_by_id(&scene.media_ids))
            .with_aspect(spec.format.aspect.as_str())
            .with_duration(scene.duration_secs);
        tasks.push(SubTask {
            name,
            kind: OperationKind::VideoGeneration,
            mandatory: true,
            request,
        });
    }

    if let (Some(voice), Some(script)) = (spec.voice.as_ref(), brief.voice_script.as_ref()) {
        tasks.push(SubTask {
            name: TASK_VOICE.to_string(),
            kind: OperationKind::VoiceSynthesis,
            mandatory: false,
            request: OperationRequest::voice(script.clone(), &voice.voice_id, &voice.language),
        });
    }

    tasks
}

/// Outcome of starting a job's sub-tasks.
#[derive(Debug, Default)]
pub struct StartReport {
    /// Tasks with a live operation handle.
    pub started: Vec<String>,
    /// Optional tasks abandoned on start failure.
    pub degraded: Vec<String>,
    /// Set when a mandatory task could not start; the job has already been
    /// marked failed with this message.
    pub failure: Option<String>,
}

enum StartOutcome {
    Started(String),
    Degraded(String),
    MandatoryFailed { message: String },
    /// Job disappeared mid-start (cancelled); nothing to record.
    Discarded,
}

/// Starts a job's sub-tasks and merges their handles.
pub struct AssetCoordinator {
    client: Arc<dyn GenerationClient>,
    store: Arc<dyn JobStore>,
    credential_refresh: Arc<dyn CredentialRefresh>,
    policy: BackoffPolicy,
}

impl AssetCoordinator {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        store: Arc<dyn JobStore>,
        credential_refresh: Arc<dyn CredentialRefresh>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            client,
            store,
            credential_refresh,
            policy,
        }
    }

    /// Start every sub-task concurrently and merge handles as they arrive.
    ///
    /// On a mandatory start failure the job is marked failed here; the
    /// caller must not move it to Polling. Optional failures only degrade.
    pub async fn start_all(&self, job_id: &str, tasks: Vec<SubTask>) -> StartReport {
        let outcomes = join_all(tasks.into_iter().map(|task| self.start_one(job_id, task))).await;

        let mut report = StartReport::default();
        for outcome in outcomes {
            match outcome {
                StartOutcome::Started(name) => report.started.push(name),
                StartOutcome::Degraded(name) => report.degraded.push(name),
                StartOutcome::MandatoryFailed { message } => {
                    // First mandatory failure wins; the rest add nothing.
                    if report.failure.is_none() {
                        report.failure = Some(message);
                    }
                }
                StartOutcome::Discarded => {}
            }
        }

        if let Some(ref message) = report.failure {
            let mut newly_failed = false;
            let result = self.store.merge_with(job_id, |job| {
                if job.status.is_terminal() {
                    return JobPatch::new();
                }
                newly_failed = true;
                JobPatch::new()
                    .with_status(JobStatus::Failed)
                    .with_error(message.clone())
                    .fail_open_handles()
            });
            match result {
                Ok(_) if newly_failed => {
                    metrics::JOBS_FAILED.inc();
                    warn!("Job {} failed during start: {}", job_id, message);
                }
                Ok(_) => {}
                Err(StoreError::NotFound(_)) => debug!("Job {} gone before failure merge", job_id),
                Err(e) => warn!("Failed to record start failure for job {}: {}", job_id, e),
            }
        }

        report
    }

    /// Start one sub-task, retrying immediate failures per the backoff
    /// policy before the job ever reaches Polling.
    async fn start_one(&self, job_id: &str, task: SubTask) -> StartOutcome {
        let mut retry = RetryState::default();
        loop {
            match self.client.start_operation(task.kind, &task.request).await {
                Ok(started) => {
                    metrics::OPERATIONS_STARTED
                        .with_label_values(&[task.kind.as_str(), "success"])
                        .inc();
                    let handle = OperationHandle::new(started.remote_ref, task.kind);
                    debug!(
                        "Started {} for job {} as {}",
                        task.name, job_id, handle.remote_ref
                    );
                    let merged = self.store.merge_with(job_id, |_| {
                        JobPatch::new()
                            .upsert_handle(task.name.clone(), handle.clone())
                            .with_retry_state(task.name.clone(), retry.clone())
                    });
                    return match merged {
                        Ok(_) => StartOutcome::Started(task.name),
                        Err(_) => StartOutcome::Discarded,
                    };
                }
                Err(raw) => {
                    metrics::OPERATIONS_STARTED
                        .with_label_values(&[task.kind.as_str(), "error"])
                        .inc();
                    let class = classify(&raw);
                    if class == FailureClass::Permanent {
                        self.notify_permanent(&raw).await;
                    }

                    let prior = match class {
                        FailureClass::Transient => retry.transient_attempts,
                        FailureClass::QuotaExceeded => retry.quota_attempts,
                        _ => 0,
                    };
                    match self.policy.decide(class, prior) {
                        BackoffDecision::Retry { after } => {
                            match class {
                                FailureClass::Transient => retry.transient_attempts += 1,
                                FailureClass::QuotaExceeded => retry.quota_attempts += 1,
                                _ => {}
                            }
                            metrics::RETRIES_SCHEDULED
                                .with_label_values(&[class.as_str()])
                                .inc();
                            warn!(
                                "Start of {} for job {} failed ({}), retrying in {:?}: {}",
                                task.name,
                                job_id,
                                class.as_str(),
                                after,
                                raw
                            );
                            tokio::time::sleep(after).await;
                            if !self.store.contains(job_id) {
                                return StartOutcome::Discarded;
                            }
                        }
                        BackoffDecision::GiveUp => {
                            let message =
                                format!("{} failed to start: {}", task_label(task.kind), raw);
                            return if task.mandatory {
                                StartOutcome::MandatoryFailed { message }
                            } else {
                                warn!(
                                    "Optional task {} for job {} degraded: {}",
                                    task.name, job_id, raw
                                );
                                StartOutcome::Degraded(task.name)
                            };
                        }
                    }
                }
            }
        }
    }

    async fn notify_permanent(&self, raw: &RawFailure) {
        metrics::CREDENTIAL_REFRESH_SIGNALS.inc();
        self.credential_refresh.on_permanent_failure(raw).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brief::derive_brief;
    use crate::job::{
        AspectRatio, JobSpec, OutputFormat, ProductFacts, VoiceSelection,
    };

    fn spec(points: usize, voice: bool) -> JobSpec {
        JobSpec {
            product: ProductFacts {
                name: "Solar Kettle".to_string(),
                tagline: None,
                description: "A portable solar-powered kettle.".to_string(),
                selling_points: (0..points).map(|i| format!("point {}", i)).collect(),
            },
            media: vec![],
            format: OutputFormat {
                aspect: AspectRatio::Landscape,
                duration_secs: 30,
            },
            voice: voice.then(|| VoiceSelection {
                voice_id: "narrator-2".to_string(),
                language: "en".to_string(),
            }),
        }
    }

    #[test]
    fn test_single_scene_plans_video_task() {
        let spec = spec(0, false);
        let brief = derive_brief(&spec, 6).unwrap();
        let tasks = plan_sub_tasks(&spec, &brief);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, TASK_VIDEO);
        assert!(tasks[0].mandatory);
        assert_eq!(tasks[0].kind, OperationKind::VideoGeneration);
    }

    #[test]
    fn test_multi_scene_plans_scene_tasks() {
        let spec = spec(3, false);
        let brief = derive_brief(&spec, 6).unwrap();
        let tasks = plan_sub_tasks(&spec, &brief);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].name, "scene:0");
        assert_eq!(tasks[2].name, "scene:2");
        assert!(tasks.iter().all(|t| t.mandatory));
    }

    #[test]
    fn test_voice_task_is_optional() {
        let spec = spec(1, true);
        let brief = derive_brief(&spec, 6).unwrap();
        let tasks = plan_sub_tasks(&spec, &brief);
        assert_eq!(tasks.len(), 2);
        let voice = tasks.iter().find(|t| t.name == TASK_VOICE).unwrap();
        assert!(!voice.mandatory);
        assert_eq!(voice.kind, OperationKind::VoiceSynthesis);
        assert_eq!(voice.request.voice_id.as_deref(), Some("narrator-2"));
    }
}
