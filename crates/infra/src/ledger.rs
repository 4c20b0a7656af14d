//! Atomic stock reservation over the catalog stores.
//!
//! The reservation rules live in `storefront-inventory`; the ledger makes
//! the check and the decrement a single step against shared storage.

use async_trait::async_trait;
use tracing::{instrument, warn};

use storefront_catalog::ProductId;
use storefront_core::{DomainError, DomainResult};
use storefront_inventory::{apply_credit, apply_debit, plan_reservation, StockDebit};

use crate::store::catalog::{decode_doc, encode_doc};
use crate::store::{map_sqlx_error, poisoned, InMemoryCatalog, PostgresCatalog};

#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Reserve `quantity` units. Missing products are `NotFound`; a shortfall
    /// is a validation error naming the product and size.
    async fn reserve(&self, product_id: ProductId, size: Option<&str>, quantity: u32) -> DomainResult<StockDebit>;

    /// Put a previous reservation back. Missing products are ignored.
    async fn release(&self, debit: &StockDebit) -> DomainResult<()>;
}

/// One order line to reserve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineReservation {
    pub product_id: ProductId,
    pub size: Option<String>,
    pub quantity: u32,
}

/// Reserve every line or none: on the first failure the lines already
/// reserved are released before the error is returned.
pub async fn reserve_all<L>(ledger: &L, lines: &[LineReservation]) -> DomainResult<Vec<StockDebit>>
where
    L: InventoryLedger + ?Sized,
{
    let mut debits = Vec::with_capacity(lines.len());
    for line in lines {
        match ledger.reserve(line.product_id, line.size.as_deref(), line.quantity).await {
            Ok(debit) => debits.push(debit),
            Err(e) => {
                release_all(ledger, &debits).await;
                return Err(e);
            }
        }
    }
    Ok(debits)
}

/// Best-effort release of several debits. Failures are logged.
pub async fn release_all<L>(ledger: &L, debits: &[StockDebit])
where
    L: InventoryLedger + ?Sized,
{
    for debit in debits.iter().rev() {
        if let Err(e) = ledger.release(debit).await {
            warn!(product_id = %debit.product_id, quantity = debit.quantity, error = %e, "stock release failed");
        }
    }
}

#[async_trait]
impl InventoryLedger for InMemoryCatalog {
    async fn reserve(&self, product_id: ProductId, size: Option<&str>, quantity: u32) -> DomainResult<StockDebit> {
        let mut products = self.products.lock().map_err(|_| poisoned())?;
        let product = products.get_mut(&product_id).ok_or_else(DomainError::not_found)?;
        let debit = plan_reservation(product, size, quantity)?;
        apply_debit(product, &debit)?;
        Ok(debit)
    }

    async fn release(&self, debit: &StockDebit) -> DomainResult<()> {
        let mut products = self.products.lock().map_err(|_| poisoned())?;
        if let Some(product) = products.get_mut(&debit.product_id) {
            apply_credit(product, debit);
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for PostgresCatalog {
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn reserve(&self, product_id: ProductId, size: Option<&str>, quantity: u32) -> DomainResult<StockDebit> {
        let id = *product_id.aggregate_id().as_uuid();
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;

        let row = sqlx::query("SELECT data FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_product", e))?
            .ok_or_else(DomainError::not_found)?;

        let mut product: storefront_catalog::Product = decode_doc(&row)?;
        let debit = plan_reservation(&product, size, quantity)?;
        apply_debit(&mut product, &debit)?;

        sqlx::query("UPDATE products SET data = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(encode_doc(&product)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("reserve_stock", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(debit)
    }

    #[instrument(skip(self), fields(product_id = %debit.product_id), err)]
    async fn release(&self, debit: &StockDebit) -> DomainResult<()> {
        let id = *debit.product_id.aggregate_id().as_uuid();
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;

        let row = sqlx::query("SELECT data FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_product", e))?;
        let Some(row) = row else {
            return Ok(());
        };

        let mut product: storefront_catalog::Product = decode_doc(&row)?;
        apply_credit(&mut product, debit);
        sqlx::query("UPDATE products SET data = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(encode_doc(&product)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("release_stock", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }
}
