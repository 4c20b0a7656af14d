//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Order line snapshots and shipping address snapshots are value objects:
/// they are captured at order time, embedded in the order, and never change
/// afterwards. Two snapshots with the same fields are the same snapshot.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct Pincode(String);
///
/// impl ValueObject for Pincode {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
