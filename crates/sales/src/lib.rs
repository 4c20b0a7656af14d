//! Orders domain module.
//!
//! The order aggregate, its line/address snapshots and the status state
//! machine. Deterministic domain logic only (no IO, no HTTP, no storage).

pub mod line;
pub mod order;
pub mod status;

pub use line::{AddressInput, LineItem, LineItemId, ShippingAddress};
pub use order::{
    AdoptTracking, ExternalShipmentRecorded, MarkPaid, Order, OrderCommand, OrderEvent, OrderId,
    OrderPlaced, OrderTotals, PaymentReceived, PlaceOrder, RecordExternalShipment, RecordRefund,
    RefundRecorded, ShipmentInfo, StatusChanged, TrackingAdopted, UpdateStatus, DEFAULT_CARRIER,
};
pub use status::{OrderStatus, PaymentMethod, PaymentStatus};
