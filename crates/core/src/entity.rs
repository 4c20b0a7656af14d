//! Entity trait: identity + continuity across state changes.
//!
//! Catalog records (products, coupons, customers) are entities: they are
//! mutated in place by the catalog owner and only read or incidentally
//! updated by the order lifecycle.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
