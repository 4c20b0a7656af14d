//! Cart pricing and coupon evaluation.
//!
//! Pure functions over product snapshots, store settings and an optional
//! coupon. Nothing here reads storage or redeems coupons; the checkout
//! workflow feeds the evaluator and acts on its outcome.

pub mod coupon;
pub mod evaluator;

pub use coupon::{evaluate_coupon, CouponOutcome, CouponRejection, CouponRequest};
pub use evaluator::{price_cart, price_line, CartLine, PricedCart, PricedLine};
