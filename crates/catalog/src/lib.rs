//! Catalog records the order lifecycle reads: products, coupons, store settings.
//!
//! The catalog itself (admin CRUD) lives elsewhere; this crate only models
//! the fields checkout depends on, as deterministic domain logic.

pub mod coupon;
pub mod product;
pub mod settings;

pub use coupon::{Coupon, CouponId, DiscountType};
pub use product::{Product, ProductId, StockStatus};
pub use settings::StoreSettings;
