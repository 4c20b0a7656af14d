use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use storefront_catalog::{Coupon, DiscountType};
use storefront_core::Amount;
use storefront_core::money::percent_of;

/// Why a coupon was not applied. Checkout treats every variant as non-fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CouponRejection {
    #[error("Invalid coupon code")]
    NotFound,
    #[error("Coupon is not active")]
    Inactive,
    #[error("Coupon is not yet active")]
    NotStarted,
    #[error("Coupon has expired")]
    Expired,
    #[error("Coupon usage limit reached")]
    UsageLimitReached,
    #[error("Minimum cart value of {min} required")]
    BelowMinCartValue { min: Amount },
    #[error("Buy at least {min} items to use this coupon")]
    BelowMinQuantity { min: u32 },
    #[error("Coupon is valid on the first order only")]
    FirstOrderOnly,
}

impl CouponRejection {
    /// Stable machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            CouponRejection::NotFound => "not_found",
            CouponRejection::Inactive => "inactive",
            CouponRejection::NotStarted => "not_started",
            CouponRejection::Expired => "expired",
            CouponRejection::UsageLimitReached => "usage_limit_reached",
            CouponRejection::BelowMinCartValue { .. } => "below_min_cart_value",
            CouponRejection::BelowMinQuantity { .. } => "below_min_quantity",
            CouponRejection::FirstOrderOnly => "first_order_only",
        }
    }
}

/// Cart facts a coupon is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct CouponRequest {
    pub subtotal: Amount,
    pub total_quantity: u32,
    pub customer_has_orders: bool,
    pub now: DateTime<Utc>,
}

/// Result of trying a coupon code on a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CouponOutcome {
    NotRequested,
    Applied { code: String, discount: Amount },
    NotApplied { code: String, rejection: CouponRejection },
}

impl CouponOutcome {
    pub fn discount(&self) -> Amount {
        match self {
            CouponOutcome::Applied { discount, .. } => *discount,
            _ => 0,
        }
    }

    pub fn applied_code(&self) -> Option<&str> {
        match self {
            CouponOutcome::Applied { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Check eligibility and compute the discount, clamped to the subtotal.
///
/// Checks run in a fixed order and the first failure is reported.
pub fn evaluate_coupon(coupon: Option<&Coupon>, request: &CouponRequest) -> Result<Amount, CouponRejection> {
    let coupon = coupon.ok_or(CouponRejection::NotFound)?;

    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }
    if coupon.valid_from > request.now {
        return Err(CouponRejection::NotStarted);
    }
    if coupon.valid_until.is_some_and(|until| until < request.now) {
        return Err(CouponRejection::Expired);
    }
    if !coupon.has_uses_left() {
        return Err(CouponRejection::UsageLimitReached);
    }
    if request.subtotal < coupon.min_cart_value {
        return Err(CouponRejection::BelowMinCartValue { min: coupon.min_cart_value });
    }
    if coupon.min_quantity > 1 && request.total_quantity < coupon.min_quantity {
        return Err(CouponRejection::BelowMinQuantity { min: coupon.min_quantity });
    }
    if coupon.first_order_only && request.customer_has_orders {
        return Err(CouponRejection::FirstOrderOnly);
    }

    let raw = match coupon.discount_type {
        DiscountType::Flat => coupon.discount_value,
        DiscountType::Percentage | DiscountType::BuyXGetY => {
            let pct = percent_of(request.subtotal, coupon.discount_value);
            coupon.discount_cap().map_or(pct, |cap| pct.min(cap))
        }
    };
    Ok(raw.min(request.subtotal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn request(subtotal: Amount) -> CouponRequest {
        CouponRequest { subtotal, total_quantity: 1, customer_has_orders: false, now: test_time() }
    }

    fn percent(value: u64) -> Coupon {
        Coupon::new("SAVE", DiscountType::Percentage, value, test_time() - Duration::days(1))
    }

    #[test]
    fn missing_coupon_is_not_found() {
        assert_eq!(evaluate_coupon(None, &request(100)), Err(CouponRejection::NotFound));
    }

    #[test]
    fn percentage_respects_cap() {
        let mut c = percent(20);
        assert_eq!(evaluate_coupon(Some(&c), &request(1300)), Ok(260));
        c.max_discount = Some(200);
        assert_eq!(evaluate_coupon(Some(&c), &request(1300)), Ok(200));
    }

    #[test]
    fn buy_x_get_y_is_priced_as_percentage() {
        let mut c = percent(10);
        c.discount_type = DiscountType::BuyXGetY;
        assert_eq!(evaluate_coupon(Some(&c), &request(1000)), Ok(100));
    }

    #[test]
    fn flat_discount_is_clamped_to_subtotal() {
        let c = Coupon::new("FLAT", DiscountType::Flat, 500, test_time());
        assert_eq!(evaluate_coupon(Some(&c), &request(300)), Ok(300));
    }

    #[test]
    fn exhausted_usage_never_applies() {
        let mut c = percent(10);
        c.usage_limit = Some(2);
        c.used_count = 2;
        assert_eq!(evaluate_coupon(Some(&c), &request(5000)), Err(CouponRejection::UsageLimitReached));
    }

    #[test]
    fn window_is_inclusive_at_both_ends() {
        let mut c = percent(10);
        c.valid_from = test_time();
        c.valid_until = Some(test_time());
        assert!(evaluate_coupon(Some(&c), &request(100)).is_ok());

        c.valid_from = test_time() + Duration::seconds(1);
        assert_eq!(evaluate_coupon(Some(&c), &request(100)), Err(CouponRejection::NotStarted));

        c.valid_from = test_time() - Duration::days(2);
        c.valid_until = Some(test_time() - Duration::seconds(1));
        assert_eq!(evaluate_coupon(Some(&c), &request(100)), Err(CouponRejection::Expired));
    }

    #[test]
    fn quantity_gate_only_applies_above_one() {
        let mut c = percent(10);
        c.min_quantity = 3;
        assert_eq!(
            evaluate_coupon(Some(&c), &request(1000)),
            Err(CouponRejection::BelowMinQuantity { min: 3 })
        );
        let mut req = request(1000);
        req.total_quantity = 3;
        assert_eq!(evaluate_coupon(Some(&c), &req), Ok(100));
    }

    #[test]
    fn first_order_only_rejects_returning_customers() {
        let mut c = percent(10);
        c.first_order_only = true;
        let mut req = request(1000);
        req.customer_has_orders = true;
        assert_eq!(evaluate_coupon(Some(&c), &req), Err(CouponRejection::FirstOrderOnly));
    }

    #[test]
    fn min_cart_value_message_names_the_minimum() {
        let mut c = percent(10);
        c.min_cart_value = 999;
        let err = evaluate_coupon(Some(&c), &request(500)).unwrap_err();
        assert_eq!(err.code(), "below_min_cart_value");
        assert_eq!(err.to_string(), "Minimum cart value of 999 required");
    }
}
