use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_catalog::{Coupon, Product, ProductId, StoreSettings};
use storefront_core::Amount;
use storefront_core::money::discounted;

use crate::coupon::{evaluate_coupon, CouponOutcome, CouponRequest};

/// One requested cart line.
#[derive(Debug, Clone, Copy)]
pub struct CartLine<'a> {
    pub product: &'a Product,
    pub quantity: u32,
    /// Explicit unit price sent by the storefront; wins over list price.
    pub price_override: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: ProductId,
    /// Price the discount applies to (list price, or the override).
    pub price: Amount,
    /// Percent discount captured for the line (0 for overridden prices).
    pub discount: u32,
    pub unit_price: Amount,
    pub quantity: u32,
    pub total: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub subtotal: Amount,
    pub shipping: Amount,
    pub discount: Amount,
    pub tax: Amount,
    pub total: Amount,
    pub coupon: CouponOutcome,
}

impl PricedCart {
    pub fn total_quantity(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

pub fn price_line(line: &CartLine<'_>) -> PricedLine {
    let (price, discount) = match line.price_override {
        Some(price) => (price, 0),
        None => (line.product.price, line.product.discount.min(100)),
    };
    let unit_price = discounted(price, discount);
    PricedLine {
        product_id: line.product.id,
        price,
        discount,
        unit_price,
        quantity: line.quantity,
        total: unit_price.saturating_mul(u64::from(line.quantity)),
    }
}

/// Price a cart: lines, subtotal, shipping, coupon discount and total.
///
/// `coupon` is the record resolved for `coupon_code` (or `None` when the code
/// matched nothing). An ineligible coupon yields `CouponOutcome::NotApplied`
/// and a zero discount; pricing itself never fails.
pub fn price_cart(
    lines: &[CartLine<'_>],
    settings: &StoreSettings,
    coupon_code: Option<&str>,
    coupon: Option<&Coupon>,
    customer_has_orders: bool,
    now: DateTime<Utc>,
) -> PricedCart {
    let lines: Vec<PricedLine> = lines.iter().map(price_line).collect();
    let subtotal: Amount = lines.iter().map(|l| l.total).sum();
    let shipping = settings.shipping_for(subtotal);
    let total_quantity = lines.iter().map(|l| l.quantity).sum();

    let coupon = match coupon_code.map(str::trim).filter(|c| !c.is_empty()) {
        None => CouponOutcome::NotRequested,
        Some(code) => {
            let request = CouponRequest { subtotal, total_quantity, customer_has_orders, now };
            let code = code.to_uppercase();
            match evaluate_coupon(coupon, &request) {
                Ok(discount) => CouponOutcome::Applied { code, discount },
                Err(rejection) => CouponOutcome::NotApplied { code, rejection },
            }
        }
    };

    let discount = coupon.discount();
    let total = (subtotal + shipping).saturating_sub(discount);

    PricedCart {
        lines,
        subtotal,
        shipping,
        discount,
        tax: 0,
        total,
        coupon,
    }
}
