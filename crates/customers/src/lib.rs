//! Customer records as touched by checkout: guest resolution and running totals.

pub mod customer;

pub use customer::{Address, AddressType, ContactInfo, Customer, CustomerId};
