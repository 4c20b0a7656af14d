//! Postgres-backed snapshot store.
//!
//! One `aggregates` table holds every aggregate type. The version column is
//! the optimistic concurrency token: inserts use `ON CONFLICT DO NOTHING` and
//! updates are conditional on `version = expected`, so a lost race shows up
//! as zero affected rows and maps to [`StoreError::Concurrency`].

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use storefront_core::{AggregateId, AggregateRoot, ExpectedVersion};
use storefront_customers::CustomerId;

use super::{map_sqlx_error, AggregateStore, Snapshot, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Create tables, indexes and sequences if they do not exist.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("migrate", e))?;
    Ok(())
}

pub struct PostgresAggregateStore<A> {
    pool: Arc<PgPool>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A> PostgresAggregateStore<A> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            _aggregate: PhantomData,
        }
    }
}

impl<A> Clone for PostgresAggregateStore<A> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _aggregate: PhantomData,
        }
    }
}

fn decode<A: Snapshot>(rows: Vec<sqlx::postgres::PgRow>) -> Result<Vec<A>, StoreError> {
    rows.into_iter()
        .map(|row| {
            let state: serde_json::Value = row
                .try_get("state")
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            serde_json::from_value(state).map_err(|e| StoreError::Serialization(e.to_string()))
        })
        .collect()
}

fn to_i64(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Backend(format!("version {version} out of range")))
}

#[async_trait]
impl<A: Snapshot> AggregateStore<A> for PostgresAggregateStore<A> {
    #[instrument(skip(self), fields(aggregate_type = A::AGGREGATE_TYPE), err)]
    async fn load(&self, id: AggregateId) -> Result<Option<A>, StoreError> {
        let rows = sqlx::query("SELECT state FROM aggregates WHERE aggregate_type = $1 AND aggregate_id = $2")
            .bind(A::AGGREGATE_TYPE)
            .bind(id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load", e))?;
        Ok(decode::<A>(rows)?.into_iter().next())
    }

    #[instrument(
        skip(self, aggregate),
        fields(
            aggregate_type = A::AGGREGATE_TYPE,
            aggregate_id = %aggregate.snapshot_id(),
            version = aggregate.version()
        ),
        err
    )]
    async fn save(&self, aggregate: &A, expected: ExpectedVersion) -> Result<(), StoreError> {
        let state = serde_json::to_value(aggregate).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let id = aggregate.snapshot_id();
        let version = to_i64(aggregate.version())?;
        let owner = aggregate.owner().map(|c| *c.aggregate_id().as_uuid());
        let lookup = aggregate.lookup_key();
        let created_at = aggregate.created_at();

        let affected = match expected {
            ExpectedVersion::Exact(0) => sqlx::query(
                r#"
                INSERT INTO aggregates (aggregate_type, aggregate_id, version, state, customer_id, lookup_key, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (aggregate_type, aggregate_id) DO NOTHING
                "#,
            )
            .bind(A::AGGREGATE_TYPE)
            .bind(id.as_uuid())
            .bind(version)
            .bind(&state)
            .bind(owner)
            .bind(&lookup)
            .bind(created_at)
            .execute(&*self.pool)
            .await,
            ExpectedVersion::Exact(prev) => sqlx::query(
                r#"
                UPDATE aggregates
                SET version = $3, state = $4, customer_id = $5, lookup_key = $6, updated_at = now()
                WHERE aggregate_type = $1 AND aggregate_id = $2 AND version = $7
                "#,
            )
            .bind(A::AGGREGATE_TYPE)
            .bind(id.as_uuid())
            .bind(version)
            .bind(&state)
            .bind(owner)
            .bind(&lookup)
            .bind(to_i64(prev)?)
            .execute(&*self.pool)
            .await,
            ExpectedVersion::Any => sqlx::query(
                r#"
                INSERT INTO aggregates (aggregate_type, aggregate_id, version, state, customer_id, lookup_key, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (aggregate_type, aggregate_id) DO UPDATE
                SET version = EXCLUDED.version, state = EXCLUDED.state,
                    customer_id = EXCLUDED.customer_id, lookup_key = EXCLUDED.lookup_key, updated_at = now()
                "#,
            )
            .bind(A::AGGREGATE_TYPE)
            .bind(id.as_uuid())
            .bind(version)
            .bind(&state)
            .bind(owner)
            .bind(&lookup)
            .bind(created_at)
            .execute(&*self.pool)
            .await,
        }
        .map_err(|e| match map_sqlx_error("save", e) {
            StoreError::AlreadyExists(_) => StoreError::AlreadyExists(format!(
                "{} {}",
                A::AGGREGATE_TYPE,
                lookup.clone().unwrap_or_default()
            )),
            other => other,
        })?
        .rows_affected();

        if affected == 0 {
            return Err(StoreError::Concurrency(format!(
                "{} {id}: expected {expected:?}",
                A::AGGREGATE_TYPE
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(aggregate_type = A::AGGREGATE_TYPE), err)]
    async fn find_by_key(&self, key: &str) -> Result<Vec<A>, StoreError> {
        let rows = sqlx::query(
            "SELECT state FROM aggregates WHERE aggregate_type = $1 AND lookup_key = $2 ORDER BY created_at DESC",
        )
        .bind(A::AGGREGATE_TYPE)
        .bind(key)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_key", e))?;
        decode(rows)
    }

    #[instrument(skip(self), fields(aggregate_type = A::AGGREGATE_TYPE), err)]
    async fn list_by_owner(&self, owner: CustomerId) -> Result<Vec<A>, StoreError> {
        let rows = sqlx::query(
            "SELECT state FROM aggregates WHERE aggregate_type = $1 AND customer_id = $2 ORDER BY created_at DESC",
        )
        .bind(A::AGGREGATE_TYPE)
        .bind(owner.aggregate_id().as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_by_owner", e))?;
        decode(rows)
    }

    #[instrument(skip(self), fields(aggregate_type = A::AGGREGATE_TYPE), err)]
    async fn list_all(&self) -> Result<Vec<A>, StoreError> {
        let rows = sqlx::query("SELECT state FROM aggregates WHERE aggregate_type = $1 ORDER BY created_at DESC")
            .bind(A::AGGREGATE_TYPE)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_all", e))?;
        decode(rows)
    }
}
