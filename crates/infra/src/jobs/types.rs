//! Job records, kinds and retry policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storefront_sales::OrderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// What a job does; handlers are registered per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    #[serde(rename = "fulfillment.create_shipment")]
    CreateShipment,
    #[serde(rename = "fulfillment.refetch_shipment")]
    RefetchShipment,
    #[serde(rename = "payments.refund")]
    Refund,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::CreateShipment => "fulfillment.create_shipment",
            JobKind::RefetchShipment => "fulfillment.refetch_shipment",
            JobKind::Refund => "payments.refund",
        }
    }

    /// Default retry policy for this kind.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            JobKind::CreateShipment => RetryPolicy::exponential(5, Duration::from_secs(2), Duration::from_secs(120)),
            JobKind::RefetchShipment => RetryPolicy::fixed(3, Duration::from_secs(30)),
            JobKind::Refund => RetryPolicy::exponential(6, Duration::from_secs(5), Duration::from_secs(600)),
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `fulfillment.create_shipment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentJob {
    pub order_id: OrderId,
    #[serde(default)]
    pub courier_id: Option<String>,
}

/// Payload of `fulfillment.refetch_shipment` and `payments.refund`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderJob {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    /// Failed; another attempt is scheduled.
    Failed { error: String, attempt: u32 },
    DeadLettered { error: String, attempts: u32 },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::DeadLettered { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    #[default]
    Exponential,
    Linear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Fraction of the delay (0.0-1.0) spread around it, deterministically.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(5, Duration::from_millis(500), Duration::from_secs(60))
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn linear(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Linear,
            jitter: 0.0,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }

    /// Delay before the attempt following attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Linear => (base_ms * f64::from(attempt)).min(max_ms),
            BackoffStrategy::Exponential => (base_ms * 2_f64.powi(attempt as i32 - 1)).min(max_ms),
        };

        let spread = delay_ms * self.jitter.clamp(0.0, 1.0);
        let offset = if spread > 0.0 {
            let pseudo = f64::from((attempt * 17) % 100) / 100.0;
            spread * (pseudo - 0.5) * 2.0
        } else {
            0.0
        };
        Duration::from_millis((delay_ms + offset).max(0.0) as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub retry_policy: RetryPolicy,
    /// Attempts started so far.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Not runnable before this instant.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub history: Vec<JobAttemptRecord>,
}

impl Job {
    pub fn new(kind: JobKind, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind,
            payload,
            status: JobStatus::Pending,
            retry_policy: kind.retry_policy(),
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            history: Vec::new(),
        }
    }

    pub fn create_shipment(order_id: OrderId, courier_id: Option<String>) -> Self {
        Self::typed(JobKind::CreateShipment, &ShipmentJob { order_id, courier_id })
    }

    pub fn refetch_shipment(order_id: OrderId) -> Self {
        Self::typed(JobKind::RefetchShipment, &OrderJob { order_id })
    }

    pub fn refund(order_id: OrderId) -> Self {
        Self::typed(JobKind::Refund, &OrderJob { order_id })
    }

    fn typed<P: Serialize>(kind: JobKind, payload: &P) -> Self {
        Self::new(kind, serde_json::to_value(payload).unwrap_or_default())
    }

    pub fn payload_as<P: DeserializeOwned>(&self) -> Result<P, String> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| format!("malformed {} payload: {e}", self.kind))
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.scheduled_at = Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
        self
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.is_none_or(|at| now >= at)
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.attempt += 1;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, started_at: DateTime<Utc>) {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.updated_at = now;
        self.record(started_at, now, None);
    }

    /// Record a failed attempt: schedules the next one with backoff, or
    /// dead-letters once the policy is exhausted (or `retryable` is false).
    pub fn mark_failed(&mut self, error: String, started_at: DateTime<Utc>, retryable: bool) {
        let now = Utc::now();
        self.updated_at = now;
        self.record(started_at, now, Some(error.clone()));

        if retryable && self.retry_policy.should_retry(self.attempt) {
            let delay = self.retry_policy.delay_for_attempt(self.attempt);
            self.scheduled_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
            self.status = JobStatus::Failed { error, attempt: self.attempt };
        } else {
            self.status = JobStatus::DeadLettered { error, attempts: self.attempt };
        }
    }

    fn record(&mut self, started_at: DateTime<Utc>, finished_at: DateTime<Utc>, error: Option<String>) {
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at,
            success: error.is_none(),
            error,
        });
    }
}

/// What a handler reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Success,
    /// Transient failure; retried per the job's policy.
    Failure(String),
    /// Permanent failure; dead-lettered immediately.
    Fatal(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: Job,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(job: Job, reason: String) -> Self {
        Self { job, dead_lettered_at: Utc::now(), reason }
    }
}
