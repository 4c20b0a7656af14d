//! Stock reservation policy.
//!
//! Pure, deterministic rules for debiting and crediting product stock. The
//! atomic storage-level application of these rules lives in the infra ledger;
//! this crate only decides *what* a reservation touches and whether it fits.

pub mod reservation;

pub use reservation::{apply_credit, apply_debit, plan_reservation, StockDebit, StockSource};
