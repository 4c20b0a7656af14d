use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use storefront_core::{AggregateId, AggregateRoot, ExpectedVersion};
use storefront_customers::CustomerId;

use super::{poisoned, AggregateStore, Snapshot, StoreError};

/// In-memory snapshot store for tests/dev.
#[derive(Debug)]
pub struct InMemoryAggregateStore<A> {
    records: RwLock<HashMap<AggregateId, A>>,
}

impl<A> InMemoryAggregateStore<A> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl<A> Default for InMemoryAggregateStore<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Snapshot> InMemoryAggregateStore<A> {
    fn collect<F>(&self, keep: F) -> Result<Vec<A>, StoreError>
    where
        F: Fn(&A) -> bool,
    {
        let records = self.records.read().map_err(|_| poisoned())?;
        let mut out: Vec<A> = records.values().filter(|a| keep(a)).cloned().collect();
        out.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(out)
    }
}

#[async_trait]
impl<A: Snapshot> AggregateStore<A> for InMemoryAggregateStore<A> {
    async fn load(&self, id: AggregateId) -> Result<Option<A>, StoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(&id).cloned())
    }

    async fn save(&self, aggregate: &A, expected: ExpectedVersion) -> Result<(), StoreError> {
        let id = aggregate.snapshot_id();
        let mut records = self.records.write().map_err(|_| poisoned())?;

        let current = records.get(&id).map(|a| a.version()).unwrap_or(0);
        if !expected.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "{} {id}: expected {expected:?}, found version {current}",
                A::AGGREGATE_TYPE
            )));
        }

        if A::UNIQUE_LOOKUP {
            if let Some(key) = aggregate.lookup_key() {
                let taken = records
                    .iter()
                    .any(|(other, a)| *other != id && a.lookup_key().as_deref() == Some(key.as_str()));
                if taken {
                    return Err(StoreError::AlreadyExists(format!("{} {key}", A::AGGREGATE_TYPE)));
                }
            }
        }

        records.insert(id, aggregate.clone());
        Ok(())
    }

    async fn find_by_key(&self, key: &str) -> Result<Vec<A>, StoreError> {
        self.collect(|a| a.lookup_key().as_deref() == Some(key))
    }

    async fn list_by_owner(&self, owner: CustomerId) -> Result<Vec<A>, StoreError> {
        self.collect(|a| a.owner() == Some(owner))
    }

    async fn list_all(&self) -> Result<Vec<A>, StoreError> {
        self.collect(|_| true)
    }
}
