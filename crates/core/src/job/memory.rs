//! In-memory job store.
//!
//! Jobs live only for the process lifetime. The whole table sits behind one
//! lock; merges therefore serialize per job (and, incidentally, across
//! jobs), which satisfies the ordering guarantee the scheduler relies on.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::job::{
    Job, JobEvent, JobFilter, JobId, JobStatus, JobStore, MergeFn, StoreError,
};

/// Capacity of the change-event channel; slow subscribers lag, they do not
/// block merges.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The only in-tree [`JobStore`] implementation.
pub struct InMemoryJobStore {
    inner: RwLock<HashMap<JobId, Job>>,
    events: broadcast::Sender<JobEvent>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: JobEvent) {
        // Send errors only mean nobody is subscribed.
        let _ = self.events.send(event);
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: Job) {
        let view = job.view();
        self.write().insert(job.id.clone(), job);
        self.emit(JobEvent::Updated { job: view });
    }

    fn get(&self, id: &str) -> Option<Job> {
        self.read().get(id).cloned()
    }

    fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    fn list(&self, filter: &JobFilter) -> Vec<Job> {
        let map = self.read();
        let mut jobs: Vec<Job> = map
            .values()
            .filter(|j| filter.status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        jobs.into_iter().skip(filter.offset).take(filter.limit).collect()
    }

    fn count_status(&self, status: JobStatus) -> usize {
        self.read().values().filter(|j| j.status == status).count()
    }

    fn oldest_pending(&self) -> Option<Job> {
        self.read()
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .min_by_key(|j| j.submitted_at)
            .cloned()
    }

    fn merge(&self, id: &str, f: MergeFn<'_>) -> Result<Job, StoreError> {
        let (updated, changed) = {
            let mut map = self.write();
            let job = map
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            // The merge function sees the record as it is right now, under
            // the table lock; the patch lands before the lock is released.
            let patch = f(job);
            let changed = !patch.is_empty();
            if changed {
                patch.apply(job, Utc::now());
            }
            (job.clone(), changed)
        };
        if changed {
            self.emit(JobEvent::Updated { job: updated.view() });
        }
        Ok(updated)
    }

    fn remove(&self, id: &str) -> Result<Job, StoreError> {
        let removed = self
            .write()
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.emit(JobEvent::Removed {
            job_id: removed.id.clone(),
        });
        Ok(removed)
    }

    fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }
}
