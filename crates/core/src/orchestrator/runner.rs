//! Production orchestrator implementation.
//!
//! Drives jobs through the state machine automatically:
//! - Admission: sequential, single-flight (one job initiating at a time)
//! - Remote production: concurrent polling (many jobs, many sub-tasks)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::brief::derive_brief;
use crate::generation::{CredentialRefresh, GenerationClient};
use crate::job::{
    Job, JobEvent, JobFilter, JobId, JobPatch, JobSpec, JobStatus, JobStore, JobStoreExt,
    StoreError,
};
use crate::metrics;

use super::config::OrchestratorConfig;
use super::coordinator::{plan_sub_tasks, AssetCoordinator};
use super::poller::PollingScheduler;
use super::types::{OrchestratorError, OrchestratorStatus};

/// The production orchestrator: turns submitted specs into completed
/// artifacts via admission, scatter-started sub-tasks, and poll loops.
pub struct ProductionOrchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn JobStore>,
    coordinator: Arc<AssetCoordinator>,
    poller: Arc<PollingScheduler>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ProductionOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn JobStore>,
        client: Arc<dyn GenerationClient>,
        credential_refresh: Arc<dyn CredentialRefresh>,
    ) -> Self {
        let policy = config.backoff_policy();
        let coordinator = Arc::new(AssetCoordinator::new(
            Arc::clone(&client),
            Arc::clone(&store),
            Arc::clone(&credential_refresh),
            policy.clone(),
        ));
        let poller = Arc::new(PollingScheduler::new(
            client,
            Arc::clone(&store),
            credential_refresh,
            policy,
            config.poll_interval(),
            config.max_poll_attempts,
        ));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            store,
            coordinator,
            poller,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start the orchestrator (spawns the admission loop).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }

        info!("Starting production orchestrator");

        // Re-ensure poll loops for any handle that is already outstanding.
        self.resume_poll_loops().await;

        self.spawn_admission_loop();

        info!("Production orchestrator started");
    }

    /// Stop the orchestrator gracefully.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator not running");
            return;
        }

        info!("Stopping production orchestrator");

        let _ = self.shutdown_tx.send(());
        self.poller.shutdown().await;

        // Give the admission loop a moment to observe the signal
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("Production orchestrator stopped");
    }

    /// Get current orchestrator status.
    pub async fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            running: self.running.load(Ordering::Relaxed),
            active_poll_loops: self.poller.active_count().await,
            pending_count: self.store.count_status(JobStatus::Pending),
            initiating_count: self.store.count_status(JobStatus::Initiating),
            polling_count: self.store.count_status(JobStatus::Polling),
            quota_wait_count: self.store.count_status(JobStatus::QuotaWait),
            completed_count: self.store.count_status(JobStatus::Completed),
            failed_count: self.store.count_status(JobStatus::Failed),
        }
    }

    // ========================================================================
    // Inbound API
    // ========================================================================

    /// Submit a production request. Always succeeds; the job starts Pending.
    pub fn submit(&self, spec: JobSpec) -> JobId {
        let job = Job::new(spec);
        let id = job.id.clone();
        self.store.insert(job);
        metrics::JOBS_SUBMITTED.inc();
        info!("Job {} submitted", id);
        id
    }

    /// Cancel a job: remove it and stop its poll loops.
    ///
    /// Removal happens first, so a poll result already in flight finds no
    /// record to merge into and is discarded.
    pub async fn cancel(&self, job_id: &str) -> Result<Job, OrchestratorError> {
        let removed = match self.store.remove(job_id) {
            Ok(job) => job,
            Err(StoreError::NotFound(_)) => {
                return Err(OrchestratorError::JobNotFound(job_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        self.poller.cancel_job(job_id).await;
        metrics::JOBS_CANCELLED.inc();
        info!("Job {} cancelled", job_id);
        Ok(removed)
    }

    /// Manually retry a failed job: back to Pending with a fresh attempt
    /// budget (handles, retry counters, result and error cleared).
    pub fn retry_failed(&self, job_id: &str) -> Result<Job, OrchestratorError> {
        let mut wrong_status: Option<&'static str> = None;
        let job = match self.store.merge_with(job_id, |job| {
            if job.status != JobStatus::Failed {
                wrong_status = Some(job.status.as_str());
                return JobPatch::new();
            }
            JobPatch::new()
                .reset_for_retry()
                .with_status(JobStatus::Pending)
        }) {
            Ok(job) => job,
            Err(StoreError::NotFound(_)) => {
                return Err(OrchestratorError::JobNotFound(job_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(actual) = wrong_status {
            return Err(OrchestratorError::InvalidStatus {
                expected: "failed",
                actual,
            });
        }

        metrics::JOBS_RETRIED.inc();
        info!("Job {} re-queued for retry", job_id);
        Ok(job)
    }

    /// Subscribe to job change events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.store.subscribe()
    }

    /// Read a job snapshot.
    pub fn job(&self, job_id: &str) -> Option<Job> {
        self.store.get(job_id)
    }

    /// List job snapshots.
    pub fn jobs(&self, filter: &JobFilter) -> Vec<Job> {
        self.store.list(filter)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Re-ensure a poll loop for every outstanding handle (e.g. after a
    /// stop/start cycle within the same process).
    async fn resume_poll_loops(&self) {
        let jobs = self.store.list(&JobFilter::new().with_limit(usize::MAX));
        for job in jobs {
            if job.status == JobStatus::Failed {
                continue;
            }
            for (task, handle) in &job.operation_handles {
                if !handle.phase.is_terminal() {
                    debug!("Resuming poll loop for {}/{}", job.id, task);
                    self.poller.ensure_polling(&job.id, task).await;
                }
            }
        }
    }

    /// Spawn the admission loop task.
    fn spawn_admission_loop(&self) {
        let running = Arc::clone(&self.running);
        let store = Arc::clone(&self.store);
        let coordinator = Arc::clone(&self.coordinator);
        let poller = Arc::clone(&self.poller);
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Admission loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Admission loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(config.admission_poll_interval()) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = Self::admit_next(&store, &coordinator, &poller, &config).await {
                            warn!("Admission error: {}", e);
                        }
                    }
                }
            }
            info!("Admission loop stopped");
        });
    }

    /// Admit and drive at most one pending job.
    async fn admit_next(
        store: &Arc<dyn JobStore>,
        coordinator: &Arc<AssetCoordinator>,
        poller: &Arc<PollingScheduler>,
        config: &OrchestratorConfig,
    ) -> Result<(), OrchestratorError> {
        // Single-flight: a job mid-setup blocks further admission. Jobs
        // already polling do not.
        if store.count_status(JobStatus::Initiating) > 0 {
            return Ok(());
        }

        let Some(job) = store.oldest_pending() else {
            return Ok(()); // Nothing to do
        };

        debug!("Admitting job {}", job.id);

        let admitted = match store.merge_with(&job.id, |current| {
            if current.status != JobStatus::Pending {
                return JobPatch::new();
            }
            JobPatch::new()
                .with_status(JobStatus::Initiating)
                .clear_error()
        }) {
            Ok(job) => job,
            Err(StoreError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if admitted.status != JobStatus::Initiating {
            return Ok(());
        }

        // Synchronous setup: derive the creative brief. A failure here goes
        // straight to Failed; no operation was started, nothing to clean up.
        let brief = match derive_brief(&admitted.spec, config.max_scenes) {
            Ok(brief) => brief,
            Err(e) => {
                warn!("Brief derivation failed for job {}: {}", admitted.id, e);
                let mut newly_failed = false;
                let _ = store.merge_with(&admitted.id, |current| {
                    if current.status.is_terminal() {
                        return JobPatch::new();
                    }
                    newly_failed = true;
                    JobPatch::new()
                        .with_status(JobStatus::Failed)
                        .with_error(e.to_string())
                });
                if newly_failed {
                    metrics::JOBS_FAILED.inc();
                }
                return Ok(());
            }
        };

        // Publish the plan before any scene starts rendering.
        match store.merge_with(&admitted.id, |_| JobPatch::new().with_brief(brief.clone())) {
            Ok(_) => {}
            Err(StoreError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        let tasks = plan_sub_tasks(&admitted.spec, &brief);
        let report = coordinator.start_all(&admitted.id, tasks).await;

        if report.failure.is_some() {
            // The coordinator already marked the job failed.
            return Ok(());
        }
        if report.started.is_empty() {
            // Every start was discarded: the job was cancelled mid-setup.
            return Ok(());
        }

        match store.merge_with(&admitted.id, |current| {
            if current.status == JobStatus::Initiating {
                JobPatch::new().with_status(JobStatus::Polling)
            } else {
                JobPatch::new()
            }
        }) {
            Ok(_) => {}
            Err(StoreError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        for task in &report.started {
            poller.ensure_polling(&admitted.id, task).await;
        }

        info!(
            "Job {} producing: {} sub-task(s) started{}",
            admitted.id,
            report.started.len(),
            if report.degraded.is_empty() {
                String::new()
            } else {
                format!(", {} degraded", report.degraded.len())
            }
        );

        Ok(())
    }
}
