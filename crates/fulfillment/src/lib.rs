//! Courier aggregator domain logic.
//!
//! Everything here is pure: shape-tolerant extraction from aggregator
//! responses, parcel sizing, courier selection and the create-order payload.
//! The HTTP client and the shipment workflow live in `storefront-infra`.

pub mod courier;
pub mod extract;
pub mod parcel;
pub mod payload;

pub use courier::{choose_courier, CourierOption};
pub use extract::{
    carrier_name, courier_options, external_order_id, external_shipment_id, find_order_in_list,
    order_list, tracking_number, ShipmentSnapshot,
};
pub use parcel::{normalize_phone, normalize_pincode, parcel_weight_kg, Dimensions, PARCEL_DIMENSIONS};
pub use payload::{build_create_order, ensure_shippable, CreateOrderItem, CreateOrderPayload};
