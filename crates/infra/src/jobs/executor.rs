//! Tokio job executor with retry and dead-lettering.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::store::JobStore;
use super::types::{Job, JobKind, JobResult, JobStatus};

pub type JobHandler = Arc<dyn Fn(Job) -> BoxFuture<'static, JobResult> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    pub poll_interval: Duration,
    pub max_concurrent: usize,
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_concurrent: 4,
            name: "job-executor".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
}

#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    /// Stop polling and wait for the loop to exit. Jobs already running finish
    /// on their own tasks.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.join.await {
            warn!(error = %e, "job executor task ended abnormally");
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Polls a [`JobStore`] and runs claimed jobs on registered async handlers.
pub struct JobExecutor<S> {
    store: S,
    handlers: HashMap<JobKind, JobHandler>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            stats: Arc::new(Mutex::new(ExecutorStats::default())),
        }
    }

    pub fn register_handler<F, Fut>(&mut self, kind: JobKind, handler: F)
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        self.handlers
            .insert(kind, Arc::new(move |job| Box::pin(handler(job)) as BoxFuture<'static, JobResult>));
    }

    /// Run one claimed job to completion and record the outcome.
    pub async fn execute(&self, mut job: Job) -> Job {
        let started = Utc::now();
        let outcome = match self.handlers.get(&job.kind) {
            Some(handler) => handler(job.clone()).await,
            None => JobResult::Fatal(format!("no handler registered for {}", job.kind)),
        };

        match outcome {
            JobResult::Success => {
                job.mark_completed(started);
                debug!(job_id = %job.id, kind = %job.kind, attempt = job.attempt, "job completed");
            }
            JobResult::Failure(error) => job.mark_failed(error, started, true),
            JobResult::Fatal(error) => job.mark_failed(error, started, false),
        }

        self.record(&job);
        self.persist(&job);
        job
    }

    /// Claim and run every job that is runnable right now, one at a time.
    pub async fn run_ready(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.store.claim_next() {
                Ok(Some(job)) => {
                    self.execute(job).await;
                    ran += 1;
                }
                Ok(None) => return ran,
                Err(e) => {
                    error!(error = %e, "failed to claim job");
                    return ran;
                }
            }
        }
    }

    pub fn spawn(self, config: JobExecutorConfig) -> JobExecutorHandle
    where
        S: Send + Sync,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let stats = self.stats.clone();
        let executor = Arc::new(self);
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));

        let join = tokio::spawn(async move {
            info!(executor = %config.name, "job executor started");
            loop {
                let permit = tokio::select! {
                    _ = &mut shutdown_rx => break,
                    permit = permits.clone().acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => break,
                    },
                };

                match executor.store.claim_next() {
                    Ok(Some(job)) => {
                        debug!(executor = %config.name, job_id = %job.id, kind = %job.kind, attempt = job.attempt, "claimed job");
                        let executor = executor.clone();
                        tokio::spawn(async move {
                            executor.execute(job).await;
                            drop(permit);
                        });
                        continue;
                    }
                    Ok(None) => {}
                    Err(e) => error!(executor = %config.name, error = %e, "failed to claim job"),
                }
                drop(permit);

                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = tokio::time::sleep(config.poll_interval) => {}
                }
            }
            info!(executor = %config.name, "job executor stopped");
        });

        JobExecutorHandle { shutdown: shutdown_tx, join, stats }
    }

    fn record(&self, job: &Job) {
        let Ok(mut stats) = self.stats.lock() else {
            return;
        };
        stats.jobs_processed += 1;
        match job.status {
            JobStatus::Completed => stats.jobs_succeeded += 1,
            JobStatus::DeadLettered { .. } => {
                stats.jobs_failed += 1;
                stats.jobs_dead_lettered += 1;
            }
            _ => stats.jobs_failed += 1,
        }
    }

    fn persist(&self, job: &Job) {
        let result = match &job.status {
            JobStatus::DeadLettered { error, attempts } => {
                warn!(job_id = %job.id, kind = %job.kind, attempts, error = %error, "job dead-lettered");
                self.store.dead_letter(job.clone(), error.clone())
            }
            JobStatus::Failed { error, attempt } => {
                warn!(job_id = %job.id, kind = %job.kind, attempt, error = %error, "job failed, retry scheduled");
                self.store.update(job)
            }
            _ => self.store.update(job),
        };
        if let Err(e) = result {
            error!(job_id = %job.id, error = %e, "failed to persist job outcome");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::RetryPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storefront_sales::OrderId;

    #[tokio::test]
    async fn successful_job_completes() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler(JobKind::Refund, |_job| async { JobResult::Success });

        let id = store.enqueue(Job::refund(OrderId::generate())).unwrap();
        assert_eq!(executor.run_ready().await, 1);

        let job = store.get(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.history.len(), 1);
    }

    #[tokio::test]
    async fn failing_job_is_retried_then_dead_lettered() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        executor.register_handler(JobKind::Refund, move |_job| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                JobResult::Failure("gateway down".into())
            }
        });

        let job = Job::refund(OrderId::generate()).with_retry_policy(RetryPolicy::fixed(2, Duration::ZERO));
        let id = store.enqueue(job).unwrap();

        executor.run_ready().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(store.get(id).unwrap().is_none());

        let dead = store.list_dead_letters(10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, "gateway down");
        assert_eq!(executor.stats.lock().unwrap().jobs_dead_lettered, 1);
    }

    #[tokio::test]
    async fn unknown_kind_is_dead_lettered_without_retry() {
        let store = InMemoryJobStore::arc();
        let executor = JobExecutor::new(store.clone());
        store.enqueue(Job::create_shipment(OrderId::generate(), None)).unwrap();

        executor.run_ready().await;
        let dead = store.list_dead_letters(10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].job.attempt, 1);
    }

    #[tokio::test]
    async fn spawned_executor_drains_queue_and_stops() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler(JobKind::RefetchShipment, |_job| async { JobResult::Success });
        for _ in 0..3 {
            store.enqueue(Job::refetch_shipment(OrderId::generate())).unwrap();
        }

        let handle = executor.spawn(JobExecutorConfig::default().with_poll_interval(Duration::from_millis(5)));
        for _ in 0..200 {
            if handle.stats().jobs_succeeded == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(handle.stats().jobs_succeeded, 3);
        handle.shutdown().await;
    }
}
