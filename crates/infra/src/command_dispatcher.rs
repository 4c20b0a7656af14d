//! Command execution pipeline for snapshot aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the snapshot (or start from an empty aggregate)
//!   ↓
//! 2. Handle the command (pure decision logic, produces events)
//!   ↓
//! 3. Apply the events and save with `ExpectedVersion::Exact(previous)`
//!   ↓
//! 4. Publish one envelope per event to the bus
//! ```
//!
//! A stale version means another writer committed in between; the dispatcher
//! reloads and re-decides a bounded number of times before surfacing
//! `DispatchError::Concurrency`. Publication happens after the save and its
//! failures are logged, never returned.

use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

use storefront_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion};
use storefront_events::{Event, EventBus, EventEnvelope};

use crate::store::{AggregateStore, Snapshot, StoreError};

/// Attempts made before a version conflict is reported to the caller.
pub const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stale version or a competing writer.
    #[error("conflict: {0}")]
    Concurrency(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvariantViolation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    /// Unique lookup key already taken (duplicate order number, ...).
    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("event serialization failed: {0}")]
    Serialize(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for DispatchError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            StoreError::AlreadyExists(what) => DispatchError::AlreadyExists(what),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// The state after a command plus the events it produced.
#[derive(Debug, Clone)]
pub struct Dispatched<A: Aggregate> {
    pub aggregate: A,
    pub events: Vec<A::Event>,
}

impl<A: Aggregate> Dispatched<A> {
    pub fn changed(&self) -> bool {
        !self.events.is_empty()
    }
}

#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run `command` against an aggregate that must already exist.
    pub async fn dispatch<A>(&self, aggregate_id: AggregateId, command: A::Command) -> Result<Dispatched<A>, DispatchError>
    where
        S: AggregateStore<A>,
        A: Snapshot<Error = DomainError>,
        A::Event: Event + Serialize,
    {
        self.run(aggregate_id, command, None::<fn(AggregateId) -> A>).await
    }

    /// Run a creation command, starting from `make_aggregate(id)` when nothing
    /// is stored under `aggregate_id` yet.
    pub async fn create<A>(
        &self,
        aggregate_id: AggregateId,
        command: A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        S: AggregateStore<A>,
        A: Snapshot<Error = DomainError>,
        A::Event: Event + Serialize,
    {
        self.run(aggregate_id, command, Some(make_aggregate)).await
    }

    async fn run<A, F>(
        &self,
        aggregate_id: AggregateId,
        command: A::Command,
        make_aggregate: Option<F>,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        S: AggregateStore<A>,
        A: Snapshot<Error = DomainError>,
        A::Event: Event + Serialize,
        F: Fn(AggregateId) -> A,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut aggregate = match (self.store.load(aggregate_id).await?, &make_aggregate) {
                (Some(existing), _) => existing,
                (None, Some(make)) => make(aggregate_id),
                (None, None) => return Err(DispatchError::NotFound),
            };
            let previous = aggregate.version();

            let events = aggregate.handle(&command)?;
            if events.is_empty() {
                return Ok(Dispatched { aggregate, events });
            }
            for event in &events {
                aggregate.apply(event);
            }

            match self.store.save(&aggregate, ExpectedVersion::Exact(previous)).await {
                Ok(()) => {
                    self.publish(A::AGGREGATE_TYPE, aggregate_id, previous, &events)?;
                    return Ok(Dispatched { aggregate, events });
                }
                Err(StoreError::Concurrency(msg)) if attempt < MAX_ATTEMPTS => {
                    debug!(aggregate_type = A::AGGREGATE_TYPE, %aggregate_id, attempt, reason = %msg, "version conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn publish<E>(&self, aggregate_type: &'static str, aggregate_id: AggregateId, previous: u64, events: &[E]) -> Result<(), DispatchError>
    where
        E: Event + Serialize,
    {
        for (i, event) in events.iter().enumerate() {
            let envelope = EventEnvelope::from_typed(aggregate_id, aggregate_type, previous + i as u64 + 1, event)
                .map_err(|e| DispatchError::Serialize(format!("{e:?}")))?;
            if let Err(e) = self.bus.publish(envelope) {
                warn!(event_type = event.event_type(), %aggregate_id, error = ?e, "event publication failed");
            }
        }
        Ok(())
    }
}
