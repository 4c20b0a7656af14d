use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{Amount, Entity};

storefront_core::typed_id!(CouponId, "CouponId");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    Percentage,
    Flat,
    /// Discounted exactly like `Percentage`.
    BuyXGetY,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    /// Always stored upper-cased.
    pub code: String,
    pub discount_type: DiscountType,
    /// Percent for percentage coupons, whole units for flat coupons.
    pub discount_value: u64,
    #[serde(default)]
    pub min_cart_value: Amount,
    #[serde(default = "default_min_quantity")]
    pub min_quantity: u32,
    /// Cap on percentage discounts. `None` or `Some(0)` means uncapped.
    #[serde(default)]
    pub max_discount: Option<Amount>,
    pub valid_from: DateTime<Utc>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    /// `None` means unlimited.
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub used_count: u32,
    pub is_active: bool,
    #[serde(default)]
    pub first_order_only: bool,
}

fn default_min_quantity() -> u32 {
    1
}

impl Coupon {
    pub fn new(
        code: &str,
        discount_type: DiscountType,
        discount_value: u64,
        valid_from: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CouponId::generate(),
            code: normalize_code(code),
            discount_type,
            discount_value,
            min_cart_value: 0,
            min_quantity: default_min_quantity(),
            max_discount: None,
            valid_from,
            valid_until: None,
            usage_limit: None,
            used_count: 0,
            is_active: true,
            first_order_only: false,
        }
    }

    pub fn has_uses_left(&self) -> bool {
        self.usage_limit.is_none_or(|limit| self.used_count < limit)
    }

    /// Effective cap, treating a zero cap as "no cap".
    pub fn discount_cap(&self) -> Option<Amount> {
        self.max_discount.filter(|cap| *cap > 0)
    }
}

impl Entity for Coupon {
    type Id = CouponId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Coupon codes are matched case-insensitively by storing them upper-cased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn codes_are_normalized() {
        let c = Coupon::new(" save10 ", DiscountType::Percentage, 10, test_time());
        assert_eq!(c.code, "SAVE10");
        assert_eq!(normalize_code("Save10"), c.code);
    }

    #[test]
    fn exhausted_limit_has_no_uses_left() {
        let mut c = Coupon::new("X", DiscountType::Flat, 100, test_time());
        assert!(c.has_uses_left());
        c.usage_limit = Some(2);
        c.used_count = 2;
        assert!(!c.has_uses_left());
    }

    #[test]
    fn zero_cap_means_uncapped() {
        let mut c = Coupon::new("X", DiscountType::Percentage, 10, test_time());
        c.max_discount = Some(0);
        assert_eq!(c.discount_cap(), None);
        c.max_discount = Some(150);
        assert_eq!(c.discount_cap(), Some(150));
    }
}
