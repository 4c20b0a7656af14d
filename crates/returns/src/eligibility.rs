use chrono::{DateTime, Duration, Utc};

use storefront_core::money::div_round;
use storefront_core::{Amount, DomainError, DomainResult};
use storefront_customers::CustomerId;
use storefront_sales::{LineItemId, Order, OrderStatus};

use crate::return_request::ReturnLine;

pub const RETURN_WINDOW_DAYS: i64 = 7;

/// One requested return line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnLineRequest {
    pub order_item_id: LineItemId,
    /// Defaults to the full ordered quantity.
    pub quantity: Option<u32>,
    pub reason: Option<String>,
}

/// Last instant a return may be requested, if the order was delivered.
pub fn return_window_end(order: &Order) -> Option<DateTime<Utc>> {
    order
        .delivered_at()
        .or(order.updated_at())
        .map(|at| at + Duration::days(RETURN_WINDOW_DAYS))
}

/// Order-level checks: ownership, delivered status, window, no open return.
pub fn check_eligibility(
    order: &Order,
    customer_id: CustomerId,
    has_open_return: bool,
    now: DateTime<Utc>,
) -> DomainResult<()> {
    if !order.belongs_to(customer_id) {
        return Err(DomainError::unauthorized());
    }
    if order.status() != OrderStatus::Delivered {
        return Err(DomainError::validation("Returns are only allowed for delivered orders"));
    }
    match return_window_end(order) {
        Some(end) if now <= end => {}
        _ => {
            return Err(DomainError::validation(format!(
                "Return window has ended. Returns must be requested within {RETURN_WINDOW_DAYS} days of delivery"
            )));
        }
    }
    if has_open_return {
        return Err(DomainError::validation("A return request for this order already exists"));
    }
    Ok(())
}

/// Resolve requested lines against the order snapshot.
///
/// Quantities are clamped to what was ordered; zero-quantity lines are
/// skipped. The refund is `price × (1 − discount/100) × quantity` summed over
/// lines and rounded once to the nearest unit.
pub fn build_return_lines(
    order: &Order,
    requests: &[ReturnLineRequest],
) -> DomainResult<(Vec<ReturnLine>, Amount)> {
    let mut lines = Vec::new();
    // Accumulated in hundredths of a unit.
    let mut refund_hundredths: u64 = 0;

    for req in requests {
        let item = order.item(req.order_item_id).ok_or_else(|| {
            DomainError::validation(format!("Invalid order item: {}", req.order_item_id))
        })?;
        let quantity = req.quantity.unwrap_or(item.quantity).min(item.quantity);
        if quantity == 0 {
            continue;
        }

        let pct = u64::from(100 - item.discount.min(100));
        refund_hundredths += item.price * pct * u64::from(quantity);

        lines.push(ReturnLine {
            order_item_id: item.line_id,
            product_id: item.product_id,
            quantity,
            size: item.size.clone(),
            reason: req.reason.clone().filter(|r| !r.trim().is_empty()),
            reserved_from: item.reserved_from.clone(),
        });
    }

    if lines.is_empty() {
        return Err(DomainError::validation(
            "Please select at least one item with quantity to return",
        ));
    }

    Ok((lines, div_round(refund_hundredths, 100)))
}
