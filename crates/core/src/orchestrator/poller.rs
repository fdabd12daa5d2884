//! Polling scheduler.
//!
//! One spawned loop per non-terminal operation handle, tracked in a map
//! keyed by (job, task). The map is the single source of truth for "is a
//! loop running": a second scheduling attempt for the same key is a no-op,
//! and a loop removes its own entry on exit. Before every merge a loop
//! checks the job is still tracked, so results arriving after cancellation
//! are discarded rather than merged.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::generation::{
    CredentialRefresh, GenerationClient, OperationKind, OperationOutput, RawFailure,
};
use crate::job::{
    is_mandatory_task, JobId, JobPatch, JobStatus, JobStore, JobStoreExt, OperationPhase,
    RetryState, TASK_VOICE,
};
use crate::metrics;
use crate::retry::{classify, BackoffDecision, BackoffPolicy, FailureClass};

use super::coordinator::task_label;

type PollKey = (JobId, String);
type ActiveMap = Arc<RwLock<HashMap<PollKey, JoinHandle<()>>>>;

/// Shared pieces a poll loop needs.
struct PollContext {
    client: Arc<dyn GenerationClient>,
    store: Arc<dyn JobStore>,
    credential_refresh: Arc<dyn CredentialRefresh>,
    policy: BackoffPolicy,
    poll_interval: Duration,
    max_poll_attempts: u32,
    active: ActiveMap,
}

/// Maintains the 1:1 mapping from non-terminal operation handles to poll
/// loops.
pub struct PollingScheduler {
    client: Arc<dyn GenerationClient>,
    store: Arc<dyn JobStore>,
    credential_refresh: Arc<dyn CredentialRefresh>,
    policy: BackoffPolicy,
    poll_interval: Duration,
    max_poll_attempts: u32,
    active: ActiveMap,
    shutdown_tx: broadcast::Sender<()>,
}

impl PollingScheduler {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        store: Arc<dyn JobStore>,
        credential_refresh: Arc<dyn CredentialRefresh>,
        policy: BackoffPolicy,
        poll_interval: Duration,
        max_poll_attempts: u32,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            client,
            store,
            credential_refresh,
            policy,
            poll_interval,
            max_poll_attempts,
            active: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
        }
    }

    /// Ensure exactly one poll loop exists for (job, task).
    ///
    /// Scheduling an already-scheduled pair is a no-op. The write lock is
    /// held across spawn + insert, so a loop that exits instantly still
    /// finds its entry to remove.
    pub async fn ensure_polling(&self, job_id: &str, task: &str) {
        let key: PollKey = (job_id.to_string(), task.to_string());
        let mut active = self.active.write().await;
        if active.contains_key(&key) {
            debug!("Poll loop for {}/{} already scheduled", job_id, task);
            return;
        }

        let ctx = PollContext {
            client: Arc::clone(&self.client),
            store: Arc::clone(&self.store),
            credential_refresh: Arc::clone(&self.credential_refresh),
            policy: self.policy.clone(),
            poll_interval: self.poll_interval,
            max_poll_attempts: self.max_poll_attempts,
            active: Arc::clone(&self.active),
        };
        let shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(poll_loop(ctx, key.clone(), shutdown_rx));
        active.insert(key, handle);
    }

    /// Stop and discard every loop belonging to a job. No further state
    /// mutation happens for it.
    pub async fn cancel_job(&self, job_id: &str) {
        let mut active = self.active.write().await;
        let keys: Vec<PollKey> = active
            .keys()
            .filter(|(id, _)| id == job_id)
            .cloned()
            .collect();
        for key in keys {
            if let Some(handle) = active.remove(&key) {
                handle.abort();
                debug!("Cancelled poll loop for {}/{}", key.0, key.1);
            }
        }
    }

    /// Number of currently active poll loops.
    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }

    /// Signal all loops to stop and abort anything still running.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let mut active = self.active.write().await;
        for (_, handle) in active.drain() {
            handle.abort();
        }
    }
}

/// The per-handle poll loop.
async fn poll_loop(ctx: PollContext, key: PollKey, mut shutdown_rx: broadcast::Receiver<()>) {
    let (job_id, task) = key.clone();
    let mandatory = is_mandatory_task(&task);
    let mut delay = ctx.poll_interval;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        delay = ctx.poll_interval;

        // Tracked check: cancelled jobs discard in-flight work, failed jobs
        // stop their remaining loops. A completed job keeps only the voice
        // loop alive (late additive merge).
        let Some(job) = ctx.store.get(&job_id) else {
            debug!("Job {} no longer tracked, dropping poll loop", job_id);
            break;
        };
        if job.status == JobStatus::Failed {
            break;
        }
        let Some(handle) = job.handle(&task).cloned() else {
            break;
        };
        if handle.phase.is_terminal() {
            break;
        }

        if handle.poll_attempts >= ctx.max_poll_attempts {
            metrics::POLL_CEILING_HITS.inc();
            observe_duration(&handle, "failed");
            let message = format!(
                "{} timed out after {} poll attempts",
                task_label(handle.kind),
                handle.poll_attempts
            );
            if mandatory {
                fail_job(&ctx, &job_id, message);
            } else {
                degrade_task(&ctx, &job_id, &task, &message);
            }
            break;
        }

        metrics::POLL_ATTEMPTS
            .with_label_values(&[handle.kind.as_str()])
            .inc();

        match ctx.client.poll_operation(&handle).await {
            Ok(poll) if poll.done => {
                if let Some(raw) = poll.failure {
                    let class = classify(&raw);
                    if class == FailureClass::Permanent {
                        notify_permanent(&ctx, &raw).await;
                    }
                    observe_duration(&handle, "failed");
                    let message = format!("{} failed: {}", task_label(handle.kind), raw);
                    if mandatory {
                        fail_job(&ctx, &job_id, message);
                    } else {
                        degrade_task(&ctx, &job_id, &task, &raw.to_string());
                    }
                } else if let Some(output) = poll.output {
                    observe_duration(&handle, "success");
                    merge_success(&ctx, &job_id, &task, output);
                } else {
                    observe_duration(&handle, "failed");
                    let message = format!(
                        "{} finished without output or error",
                        task_label(handle.kind)
                    );
                    if mandatory {
                        fail_job(&ctx, &job_id, message);
                    } else {
                        degrade_task(&ctx, &job_id, &task, &message);
                    }
                }
                break;
            }
            Ok(poll) => {
                record_still_running(&ctx, &job_id, &task, poll.progress_note);
            }
            Err(raw) => {
                let class = classify(&raw);
                if class == FailureClass::Permanent {
                    notify_permanent(&ctx, &raw).await;
                }

                let retry = job.retry_state.get(&task).cloned().unwrap_or_default();
                let prior = match class {
                    FailureClass::Transient => retry.transient_attempts,
                    FailureClass::QuotaExceeded => retry.quota_attempts,
                    _ => 0,
                };

                match ctx.policy.decide(class, prior) {
                    BackoffDecision::Retry { after } => {
                        record_retry(&ctx, &job_id, &task, class, after, &raw);
                        delay = after;
                    }
                    BackoffDecision::GiveUp => {
                        observe_duration(&handle, "failed");
                        let message = give_up_message(handle.kind, class, prior, &raw);
                        if mandatory {
                            fail_job(&ctx, &job_id, message);
                        } else {
                            degrade_task(&ctx, &job_id, &task, &raw.to_string());
                        }
                        break;
                    }
                }
            }
        }
    }

    ctx.active.write().await.remove(&key);
}

/// Record the start-to-terminal duration of one operation.
fn observe_duration(handle: &crate::job::OperationHandle, result: &str) {
    let elapsed = (Utc::now() - handle.started_at)
        .to_std()
        .unwrap_or_default();
    metrics::OPERATION_DURATION
        .with_label_values(&[handle.kind.as_str(), result])
        .observe(elapsed.as_secs_f64());
}

fn give_up_message(
    kind: OperationKind,
    class: FailureClass,
    retries: u32,
    raw: &RawFailure,
) -> String {
    match class {
        FailureClass::Transient => format!(
            "{} unavailable after {} retries: {}",
            task_label(kind),
            retries,
            raw
        ),
        FailureClass::QuotaExceeded => format!(
            "{} quota exhausted after {} retries: {}",
            task_label(kind),
            retries,
            raw
        ),
        FailureClass::Permanent | FailureClass::Unknown => {
            format!("{} failed: {}", task_label(kind), raw)
        }
    }
}

/// True when every scheduled retry delay has elapsed; gates leaving
/// QuotaWait.
fn no_pending_backoff(job: &crate::job::Job) -> bool {
    let now = Utc::now();
    job.retry_state
        .values()
        .filter_map(|r| r.next_retry_at)
        .all(|at| at <= now)
}

/// Merge a successful poll that is still running: bump bookkeeping, append
/// a progress note, and leave QuotaWait once no backoff is pending.
fn record_still_running(ctx: &PollContext, job_id: &str, task: &str, note: Option<String>) {
    let result = ctx.store.merge_with(job_id, |job| {
        let Some(current) = job.handle(task) else {
            return JobPatch::new();
        };
        let fallback = format!("{} running", task_label(current.kind));
        let mut updated = current.clone();
        updated.poll_attempts += 1;
        updated.last_poll_at = Some(Utc::now());
        updated.push_progress(note.unwrap_or(fallback));
        let mut patch = JobPatch::new().upsert_handle(task.to_string(), updated);

        if let Some(retry) = job.retry_state.get(task) {
            if retry.next_retry_at.is_some() {
                patch = patch.with_retry_state(
                    task.to_string(),
                    RetryState {
                        next_retry_at: None,
                        ..retry.clone()
                    },
                );
            }
        }
        if job.status == JobStatus::QuotaWait && no_pending_backoff(job) {
            patch = patch.with_status(JobStatus::Polling);
        }
        patch
    });
    if let Err(e) = result {
        debug!("Discarded poll progress for {}/{}: {}", job_id, task, e);
    }
}

/// Merge a retry decision: bump the class counter, stamp the next retry
/// time, and surface QuotaWait for quota failures.
fn record_retry(
    ctx: &PollContext,
    job_id: &str,
    task: &str,
    class: FailureClass,
    after: Duration,
    raw: &RawFailure,
) {
    metrics::RETRIES_SCHEDULED
        .with_label_values(&[class.as_str()])
        .inc();
    let quota = class == FailureClass::QuotaExceeded;
    if quota {
        metrics::QUOTA_WAITS.inc();
    }

    let next_at = Utc::now() + chrono::Duration::from_std(after).unwrap_or_default();
    let result = ctx.store.merge_with(job_id, |job| {
        let mut retry = job.retry_state.get(task).cloned().unwrap_or_default();
        match class {
            FailureClass::Transient => retry.transient_attempts += 1,
            FailureClass::QuotaExceeded => retry.quota_attempts += 1,
            _ => {}
        }
        retry.next_retry_at = Some(next_at);

        let mut patch = JobPatch::new().with_retry_state(task.to_string(), retry);
        if let Some(current) = job.handle(task) {
            let mut updated = current.clone();
            updated.poll_attempts += 1;
            updated.last_poll_at = Some(Utc::now());
            updated.push_progress(format!("{}, retrying in {:?}", class.as_str(), after));
            patch = patch.upsert_handle(task.to_string(), updated);
        }
        // The handle is preserved: the job waits, it is not restarted.
        if quota && !job.status.is_terminal() {
            patch = patch.with_status(JobStatus::QuotaWait);
        }
        patch
    });
    match result {
        Ok(_) => warn!(
            "Poll of {}/{} failed ({}), retrying in {:?}: {}",
            job_id,
            task,
            class.as_str(),
            after,
            raw
        ),
        Err(e) => debug!("Discarded retry for {}/{}: {}", job_id, task, e),
    }
}

/// Merge a terminal success. Applying the same result twice is a no-op: the
/// phase guard returns an empty patch once the handle is already terminal.
fn merge_success(ctx: &PollContext, job_id: &str, task: &str, output: OperationOutput) {
    let mut completed = false;
    let result = ctx.store.merge_with(job_id, |job| {
        let Some(current) = job.handle(task) else {
            return JobPatch::new();
        };
        if current.phase.is_terminal() {
            return JobPatch::new();
        }

        let mut updated = current.clone();
        updated.poll_attempts += 1;
        updated.last_poll_at = Some(Utc::now());
        updated.phase = OperationPhase::Succeeded;
        updated.push_progress("completed");
        let mut patch = JobPatch::new().upsert_handle(task.to_string(), updated);

        patch = if task == TASK_VOICE {
            patch.with_voice_url(output.media_url.clone())
        } else if let Some(index) = task
            .strip_prefix("scene:")
            .and_then(|s| s.parse::<u32>().ok())
        {
            patch.with_scene_url(index, output.media_url.clone())
        } else {
            patch.with_video_url(output.media_url.clone())
        };

        if let Some(retry) = job.retry_state.get(task) {
            if retry.next_retry_at.is_some() {
                patch = patch.with_retry_state(
                    task.to_string(),
                    RetryState {
                        next_retry_at: None,
                        ..retry.clone()
                    },
                );
            }
        }

        // Completion: every mandatory handle, counting this one as
        // succeeded, must be terminal-success. The voice task never gates.
        let all_mandatory_done = job.operation_handles.iter().all(|(name, h)| {
            name == task || !is_mandatory_task(name) || h.phase == OperationPhase::Succeeded
        });
        if !job.status.is_terminal() && is_mandatory_task(task) && all_mandatory_done {
            completed = true;
            patch = patch.with_status(JobStatus::Completed).clear_error();
        } else if job.status == JobStatus::QuotaWait && no_pending_backoff(job) {
            patch = patch.with_status(JobStatus::Polling);
        }
        patch
    });

    match result {
        Ok(job) => {
            if completed {
                metrics::JOBS_COMPLETED.inc();
                tracing::info!("Job {} completed", job.id);
            } else {
                debug!("Task {}/{} succeeded", job_id, task);
            }
        }
        Err(e) => debug!("Discarded terminal result for {}/{}: {}", job_id, task, e),
    }
}

/// Fail the whole job (mandatory task gave up or failed remotely).
fn fail_job(ctx: &PollContext, job_id: &str, message: String) {
    let mut newly_failed = false;
    let result = ctx.store.merge_with(job_id, |job| {
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
            warn!("Job {} failed: {}", job_id, message);
        }
        Ok(_) => {}
        Err(e) => debug!("Discarded failure for job {}: {}", job_id, e),
    }
}

/// Degrade an optional task: the result stays absent, the job does not
/// fail, and completion is re-evaluated in case this was the last open
/// handle.
fn degrade_task(ctx: &PollContext, job_id: &str, task: &str, reason: &str) {
    let mut completed = false;
    let result = ctx.store.merge_with(job_id, |job| {
        let Some(current) = job.handle(task) else {
            return JobPatch::new();
        };
        if current.phase.is_terminal() {
            return JobPatch::new();
        }

        let mut updated = current.clone();
        updated.phase = OperationPhase::Failed;
        updated.push_progress(format!("degraded: {}", reason));
        let mut patch = JobPatch::new().upsert_handle(task.to_string(), updated);

        if let Some(retry) = job.retry_state.get(task) {
            if retry.next_retry_at.is_some() {
                patch = patch.with_retry_state(
                    task.to_string(),
                    RetryState {
                        next_retry_at: None,
                        ..retry.clone()
                    },
                );
            }
        }

        if !job.status.is_terminal() && job.mandatory_all_succeeded() {
            completed = true;
            patch = patch.with_status(JobStatus::Completed).clear_error();
        } else if job.status == JobStatus::QuotaWait && no_pending_backoff(job) {
            patch = patch.with_status(JobStatus::Polling);
        }
        patch
    });
    match result {
        Ok(_) => {
            if completed {
                metrics::JOBS_COMPLETED.inc();
            }
            warn!(
                "Optional task {}/{} degraded, continuing without it: {}",
                job_id, task, reason
            );
        }
        Err(e) => debug!("Discarded degradation for {}/{}: {}", job_id, task, e),
    }
}

async fn notify_permanent(ctx: &PollContext, raw: &RawFailure) {
    metrics::CREDENTIAL_REFRESH_SIGNALS.inc();
    ctx.credential_refresh.on_permanent_failure(raw).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::OperationKind;
    use crate::job::{InMemoryJobStore, Job, OperationHandle};
    use crate::testing::{fixtures, MockGenerationClient, RecordingCredentialRefresh};

    fn scheduler_with_store() -> (PollingScheduler, Arc<InMemoryJobStore>) {
        let store = Arc::new(InMemoryJobStore::new());
        let scheduler = PollingScheduler::new(
            Arc::new(MockGenerationClient::new()),
            Arc::clone(&store) as Arc<dyn JobStore>,
            Arc::new(RecordingCredentialRefresh::new()),
            BackoffPolicy::default(),
            // Long enough that no tick fires during the test.
            Duration::from_secs(60),
            10,
        );
        (scheduler, store)
    }

    #[tokio::test]
    async fn test_double_schedule_is_noop() {
        let (scheduler, store) = scheduler_with_store();

        let mut job = Job::new(fixtures::job_spec("Widget"));
        job.operation_handles.insert(
            "video".to_string(),
            OperationHandle::new("op-1", OperationKind::VideoGeneration),
        );
        let job_id = job.id.clone();
        store.insert(job);

        scheduler.ensure_polling(&job_id, "video").await;
        scheduler.ensure_polling(&job_id, "video").await;
        assert_eq!(scheduler.active_count().await, 1);

        scheduler.cancel_job(&job_id).await;
        assert_eq!(scheduler.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_only_stops_that_jobs_loops() {
        let (scheduler, store) = scheduler_with_store();

        for name in ["A", "B"] {
            let mut job = Job::new(fixtures::job_spec(name));
            job.operation_handles.insert(
                "video".to_string(),
                OperationHandle::new(format!("op-{}", name), OperationKind::VideoGeneration),
            );
            store.insert(job);
        }
        let jobs = store.list(&crate::job::JobFilter::new());
        for job in &jobs {
            scheduler.ensure_polling(&job.id, "video").await;
        }
        assert_eq!(scheduler.active_count().await, 2);

        scheduler.cancel_job(&jobs[0].id).await;
        assert_eq!(scheduler.active_count().await, 1);

        scheduler.shutdown().await;
        assert_eq!(scheduler.active_count().await, 0);
    }
}
