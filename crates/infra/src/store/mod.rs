//! Aggregate snapshot persistence and the catalog/customer stores.
//!
//! Aggregates are stored as versioned JSON snapshots. `save` takes an
//! [`ExpectedVersion`] and fails with [`StoreError::Concurrency`] when another
//! writer got there first; that version check is what serialises competing
//! mutations of the same order, payment or return.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use storefront_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use storefront_customers::CustomerId;
use storefront_payments::Payment;
use storefront_returns::ReturnRequest;
use storefront_sales::Order;

pub mod catalog;
pub mod customers;
pub mod in_memory;
pub mod postgres;
pub mod sequence;

pub use catalog::{CatalogStore, InMemoryCatalog, PostgresCatalog};
pub use customers::{CustomerStore, InMemoryCustomerStore, PostgresCustomerStore};
pub use in_memory::InMemoryAggregateStore;
pub use postgres::{migrate, PostgresAggregateStore};
pub use sequence::{InMemorySequence, PostgresSequence, SequenceGenerator};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("snapshot (de)serialization failed: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Backend(String),
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => DomainError::conflict(msg),
            StoreError::AlreadyExists(what) => DomainError::conflict(format!("{what} already exists")),
            other => DomainError::invariant(other.to_string()),
        }
    }
}

pub(crate) fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::AlreadyExists(
                    db_err.constraint().unwrap_or("record").to_string(),
                ),
                Some("40001") => StoreError::Concurrency(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

/// An aggregate that can be persisted as a snapshot.
pub trait Snapshot: Aggregate + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const AGGREGATE_TYPE: &'static str;

    /// Whether two snapshots may share a lookup key.
    const UNIQUE_LOOKUP: bool;

    fn snapshot_id(&self) -> AggregateId;

    /// The customer this record belongs to, for "my orders"-style listings.
    fn owner(&self) -> Option<CustomerId>;

    /// Secondary lookup key (order number, or the order a payment/return is for).
    fn lookup_key(&self) -> Option<String>;

    fn created_at(&self) -> Option<DateTime<Utc>>;
}

impl Snapshot for Order {
    const AGGREGATE_TYPE: &'static str = "sales.order";
    const UNIQUE_LOOKUP: bool = true;

    fn snapshot_id(&self) -> AggregateId {
        self.id_typed().aggregate_id()
    }

    fn owner(&self) -> Option<CustomerId> {
        self.customer_id()
    }

    fn lookup_key(&self) -> Option<String> {
        Some(self.order_number().to_string())
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Order::created_at(self)
    }
}

impl Snapshot for Payment {
    const AGGREGATE_TYPE: &'static str = "payments.payment";
    const UNIQUE_LOOKUP: bool = true;

    fn snapshot_id(&self) -> AggregateId {
        self.id_typed().aggregate_id()
    }

    fn owner(&self) -> Option<CustomerId> {
        None
    }

    fn lookup_key(&self) -> Option<String> {
        self.order_id().map(|id| id.to_string())
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Payment::created_at(self)
    }
}

impl Snapshot for ReturnRequest {
    const AGGREGATE_TYPE: &'static str = "returns.return";
    const UNIQUE_LOOKUP: bool = false;

    fn snapshot_id(&self) -> AggregateId {
        self.id_typed().aggregate_id()
    }

    fn owner(&self) -> Option<CustomerId> {
        self.customer_id()
    }

    fn lookup_key(&self) -> Option<String> {
        self.order_id().map(|id| id.to_string())
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        ReturnRequest::created_at(self)
    }
}

/// Versioned snapshot storage for one aggregate type.
///
/// Listings are newest first.
#[async_trait]
pub trait AggregateStore<A: Snapshot>: Send + Sync {
    async fn load(&self, id: AggregateId) -> Result<Option<A>, StoreError>;

    /// Persist `aggregate` if the stored version equals `expected`
    /// (`Exact(0)` means "must not exist yet").
    async fn save(&self, aggregate: &A, expected: ExpectedVersion) -> Result<(), StoreError>;

    async fn find_by_key(&self, key: &str) -> Result<Vec<A>, StoreError>;

    async fn list_by_owner(&self, owner: CustomerId) -> Result<Vec<A>, StoreError>;

    async fn list_all(&self) -> Result<Vec<A>, StoreError>;
}

#[async_trait]
impl<A, S> AggregateStore<A> for Arc<S>
where
    A: Snapshot,
    S: AggregateStore<A> + ?Sized,
{
    async fn load(&self, id: AggregateId) -> Result<Option<A>, StoreError> {
        (**self).load(id).await
    }

    async fn save(&self, aggregate: &A, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).save(aggregate, expected).await
    }

    async fn find_by_key(&self, key: &str) -> Result<Vec<A>, StoreError> {
        (**self).find_by_key(key).await
    }

    async fn list_by_owner(&self, owner: CustomerId) -> Result<Vec<A>, StoreError> {
        (**self).list_by_owner(owner).await
    }

    async fn list_all(&self) -> Result<Vec<A>, StoreError> {
        (**self).list_all().await
    }
}
