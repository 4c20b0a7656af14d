//! Human-facing order and return numbers.
//!
//! Numbers are `<prefix><unix millis><4-digit counter>`. The counter comes from
//! an atomic (in memory) or a database sequence, so two numbers minted in the
//! same millisecond still differ.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use tracing::instrument;

use super::{map_sqlx_error, StoreError};

pub const ORDER_PREFIX: &str = "ORD";
pub const RETURN_PREFIX: &str = "RET";

fn format_number(prefix: &str, millis: i64, counter: u64) -> String {
    format!("{prefix}{millis}{:04}", counter % 10_000)
}

#[async_trait]
pub trait SequenceGenerator: Send + Sync {
    async fn next_order_number(&self) -> Result<String, StoreError>;

    async fn next_return_number(&self) -> Result<String, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemorySequence {
    orders: AtomicU64,
    returns: AtomicU64,
}

impl InMemorySequence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SequenceGenerator for InMemorySequence {
    async fn next_order_number(&self) -> Result<String, StoreError> {
        let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format_number(ORDER_PREFIX, Utc::now().timestamp_millis(), n))
    }

    async fn next_return_number(&self) -> Result<String, StoreError> {
        let n = self.returns.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format_number(RETURN_PREFIX, Utc::now().timestamp_millis(), n))
    }
}

#[derive(Debug, Clone)]
pub struct PostgresSequence {
    pool: Arc<PgPool>,
}

impl PostgresSequence {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    async fn next(&self, sequence: &'static str) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT nextval($1::regclass) AS n")
            .bind(sequence)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("nextval", e))?;
        let n: i64 = row.try_get("n").map_err(|e| map_sqlx_error("nextval", e))?;
        Ok(n.unsigned_abs())
    }
}

#[async_trait]
impl SequenceGenerator for PostgresSequence {
    #[instrument(skip(self), err)]
    async fn next_order_number(&self) -> Result<String, StoreError> {
        let n = self.next("order_number_seq").await?;
        Ok(format_number(ORDER_PREFIX, Utc::now().timestamp_millis(), n))
    }

    #[instrument(skip(self), err)]
    async fn next_return_number(&self) -> Result<String, StoreError> {
        let n = self.next("return_number_seq").await?;
        Ok(format_number(RETURN_PREFIX, Utc::now().timestamp_millis(), n))
    }
}
