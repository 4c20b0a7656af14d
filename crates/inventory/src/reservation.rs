use serde::{Deserialize, Serialize};

use storefront_catalog::{Product, ProductId};
use storefront_core::{DomainError, DomainResult};

/// Which counter was authoritative for a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockSource {
    /// Size entry was tracked (> 0): both the size entry and the general count move.
    Size { size: String },
    /// Only the general `stock_quantity` moves.
    General,
}

/// A planned (or applied) stock decrement for one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDebit {
    pub product_id: ProductId,
    pub source: StockSource,
    pub quantity: u32,
}

impl StockDebit {
    pub fn size(&self) -> Option<&str> {
        match &self.source {
            StockSource::Size { size } => Some(size),
            StockSource::General => None,
        }
    }
}

/// Decide how `quantity` units of `product` (optionally in `size`) are reserved.
///
/// A size entry that is absent or 0 is "not tracked separately": the general
/// count is authoritative. Fails with a message naming the product and size
/// when the authoritative count is short.
pub fn plan_reservation(product: &Product, size: Option<&str>, quantity: u32) -> DomainResult<StockDebit> {
    if quantity == 0 {
        return Err(DomainError::validation("quantity must be at least 1"));
    }

    let (available, source) = match (size, product.tracked_size_stock(size)) {
        (Some(size), Some(qty)) => (qty, StockSource::Size { size: size.to_string() }),
        _ => (product.stock_quantity, StockSource::General),
    };

    if available < quantity {
        return Err(shortfall(product, size, available, quantity));
    }

    Ok(StockDebit {
        product_id: product.id,
        source,
        quantity,
    })
}

/// Re-check and apply a debit against its recorded source. Callers must hold
/// exclusive access to `product` between the check and the write (one lock
/// guard or one conditional update).
pub fn apply_debit(product: &mut Product, debit: &StockDebit) -> DomainResult<()> {
    let available = match &debit.source {
        StockSource::Size { size } => product.stock_by_size.get(size).copied().unwrap_or(0),
        StockSource::General => product.stock_quantity,
    };
    if available < debit.quantity {
        return Err(shortfall(product, debit.size(), available, debit.quantity));
    }

    if let StockSource::Size { size } = &debit.source {
        if let Some(entry) = product.stock_by_size.get_mut(size) {
            *entry -= debit.quantity;
        }
    }
    product.stock_quantity = product.stock_quantity.saturating_sub(debit.quantity);
    product.refresh_stock_status();
    Ok(())
}

fn shortfall(product: &Product, size: Option<&str>, available: u32, required: u32) -> DomainError {
    let size_label = size.map(|s| format!(" - Size {s}")).unwrap_or_default();
    DomainError::validation(format!(
        "Insufficient stock for {}{}. Available: {}, Required: {}",
        product.name, size_label, available, required
    ))
}

/// Put back a previous debit. Never fails.
pub fn apply_credit(product: &mut Product, debit: &StockDebit) {
    if let StockSource::Size { size } = &debit.source {
        *product.stock_by_size.entry(size.clone()).or_insert(0) += debit.quantity;
    }
    product.stock_quantity = product.stock_quantity.saturating_add(debit.quantity);
    product.refresh_stock_status();
}
