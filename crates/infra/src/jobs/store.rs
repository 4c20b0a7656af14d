//! Job persistence.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use super::types::{DeadLetterEntry, Job, JobId, JobStatus};

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("job storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

pub trait JobStore: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the oldest runnable job, marking it running.
    fn claim_next(&self) -> Result<Option<Job>, JobStoreError>;

    /// Move a job out of the queue into the dead letters.
    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    /// Oldest first.
    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Put a dead-lettered job back in the queue with a fresh attempt budget.
    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError>;

    fn stats(&self) -> Result<JobStats, JobStoreError>;
}

fn poisoned() -> JobStoreError {
    JobStoreError::Storage("lock poisoned".to_string())
}

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    dead_letters: RwLock<HashMap<JobId, DeadLetterEntry>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs.get(&job_id).cloned())
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        match jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(JobStoreError::NotFound(job.id)),
        }
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let now = Utc::now();

        let next = jobs
            .values()
            .filter(|j| matches!(j.status, JobStatus::Pending | JobStatus::Failed { .. }) && j.is_ready(now))
            .min_by_key(|j| (j.scheduled_at.unwrap_or(j.created_at), j.created_at))
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            jobs.get_mut(&id).map(|job| {
                job.mark_running();
                job.clone()
            })
        }))
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let mut dead = self.dead_letters.write().map_err(|_| poisoned())?;
        jobs.remove(&job.id);
        dead.insert(job.id, DeadLetterEntry::new(job, reason));
        Ok(())
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let dead = self.dead_letters.read().map_err(|_| poisoned())?;
        let mut entries: Vec<_> = dead.values().cloned().collect();
        entries.sort_by_key(|e| e.dead_lettered_at);
        entries.truncate(limit);
        Ok(entries)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let mut dead = self.dead_letters.write().map_err(|_| poisoned())?;

        let mut job = dead.remove(&job_id).ok_or(JobStoreError::NotFound(job_id))?.job;
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.updated_at = Utc::now();

        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        let dead = self.dead_letters.read().map_err(|_| poisoned())?;

        let mut stats = JobStats { dead_lettered: dead.len(), ..JobStats::default() };
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
            }
        }
        Ok(stats)
    }
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next()
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason)
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(limit)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).retry_dead_letter(job_id)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        (**self).stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use storefront_sales::OrderId;

    #[test]
    fn claim_marks_running_once() {
        let store = InMemoryJobStore::new();
        let id = store.enqueue(Job::refund(OrderId::generate())).unwrap();

        let claimed = store.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.attempt, 1);
        assert!(store.claim_next().unwrap().is_none());
    }

    #[test]
    fn delayed_jobs_wait_for_their_slot() {
        let store = InMemoryJobStore::new();
        store
            .enqueue(Job::refetch_shipment(OrderId::generate()).delayed(Duration::from_secs(60)))
            .unwrap();
        assert!(store.claim_next().unwrap().is_none());
        assert_eq!(store.stats().unwrap().pending, 1);
    }

    #[test]
    fn dead_letters_can_be_retried() {
        let store = InMemoryJobStore::new();
        let id = store.enqueue(Job::refund(OrderId::generate())).unwrap();
        let mut claimed = store.claim_next().unwrap().unwrap();
        claimed.mark_failed("gateway down".into(), Utc::now(), false);
        store.dead_letter(claimed, "gateway down".into()).unwrap();

        assert!(store.get(id).unwrap().is_none());
        let dead = store.list_dead_letters(10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, "gateway down");

        let retried = store.retry_dead_letter(id).unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert_eq!(retried.attempt, 0);
        assert_eq!(retried.history.len(), 1);
        assert!(store.list_dead_letters(10).unwrap().is_empty());
        assert!(matches!(store.retry_dead_letter(id), Err(JobStoreError::NotFound(_))));
    }
}
