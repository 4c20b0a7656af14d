use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use storefront_core::Amount;
use storefront_customers::{Customer, CustomerId};

use super::catalog::{decode_doc, encode_doc};
use super::{map_sqlx_error, poisoned, StoreError};

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn get(&self, id: CustomerId) -> Result<Option<Customer>, StoreError>;

    /// Case-insensitive email lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError>;

    /// Fails with `AlreadyExists` when the email is taken.
    async fn create(&self, customer: &Customer) -> Result<(), StoreError>;

    /// Bump order count and total spent. Unknown customers are ignored.
    async fn record_order(&self, id: CustomerId, total: Amount, at: DateTime<Utc>) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCustomerStore {
    customers: RwLock<HashMap<CustomerId, Customer>>,
}

impl InMemoryCustomerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl CustomerStore for InMemoryCustomerStore {
    async fn get(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self.customers.read().map_err(|_| poisoned())?.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError> {
        let customers = self.customers.read().map_err(|_| poisoned())?;
        Ok(customers.values().find(|c| c.matches_email(email)).cloned())
    }

    async fn create(&self, customer: &Customer) -> Result<(), StoreError> {
        let mut customers = self.customers.write().map_err(|_| poisoned())?;
        if customers.values().any(|c| c.matches_email(customer.email())) {
            return Err(StoreError::AlreadyExists(format!("customer {}", customer.email())));
        }
        customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn record_order(&self, id: CustomerId, total: Amount, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut customers = self.customers.write().map_err(|_| poisoned())?;
        if let Some(customer) = customers.get_mut(&id) {
            customer.record_order(total, at);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PostgresCustomerStore {
    pool: Arc<PgPool>,
}

impl PostgresCustomerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl CustomerStore for PostgresCustomerStore {
    #[instrument(skip(self), fields(customer_id = %id), err)]
    async fn get(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query("SELECT data FROM customers WHERE id = $1")
            .bind(id.aggregate_id().as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_customer", e))?;
        row.as_ref().map(decode_doc).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query("SELECT data FROM customers WHERE lower(email) = lower($1)")
            .bind(email.trim())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_customer_by_email", e))?;
        row.as_ref().map(decode_doc).transpose()
    }

    #[instrument(skip(self, customer), fields(customer_id = %customer.id), err)]
    async fn create(&self, customer: &Customer) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO customers (id, email, data) VALUES ($1, $2, $3)")
            .bind(customer.id.aggregate_id().as_uuid())
            .bind(customer.email())
            .bind(encode_doc(customer)?)
            .execute(&*self.pool)
            .await
            .map_err(|e| match map_sqlx_error("create_customer", e) {
                StoreError::AlreadyExists(_) => {
                    StoreError::AlreadyExists(format!("customer {}", customer.email()))
                }
                other => other,
            })?;
        Ok(())
    }

    #[instrument(skip(self), fields(customer_id = %id), err)]
    async fn record_order(&self, id: CustomerId, total: Amount, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
        let row = sqlx::query("SELECT data FROM customers WHERE id = $1 FOR UPDATE")
            .bind(id.aggregate_id().as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_customer", e))?;
        let Some(row) = row else {
            return Ok(());
        };
        let mut customer: Customer = decode_doc(&row)?;
        customer.record_order(total, at);
        sqlx::query("UPDATE customers SET data = $2 WHERE id = $1")
            .bind(id.aggregate_id().as_uuid())
            .bind(encode_doc(&customer)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("record_order", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn email_is_unique_regardless_of_case() {
        let store = InMemoryCustomerStore::new();
        store.create(&Customer::new("A", "a@example.com", at())).await.unwrap();

        let err = store
            .create(&Customer::new("B", "A@Example.com", at()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert!(store.find_by_email("A@EXAMPLE.COM").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn record_order_updates_running_totals() {
        let store = InMemoryCustomerStore::new();
        let customer = Customer::new("A", "a@example.com", at());
        store.create(&customer).await.unwrap();

        store.record_order(customer.id, 1300, at()).await.unwrap();
        let stored = store.get(customer.id).await.unwrap().unwrap();
        assert_eq!(stored.total_orders, 1);
        assert_eq!(stored.total_spent, 1300);

        store.record_order(CustomerId::generate(), 10, at()).await.unwrap();
    }
}
