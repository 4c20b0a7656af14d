//! HTTP clients for the payment gateway and the courier aggregator.
//!
//! Both sit behind traits so workflows can be driven by in-process fakes.
//! Every call carries the configured per-request timeout.

pub mod courier;
pub mod payment_gateway;

pub use courier::{CourierClient, CourierError, HttpCourierClient, ServiceabilityQuery};
pub use payment_gateway::{
    CreateGatewayOrder, GatewayError, GatewayNotes, GatewayOrder, GatewayRefund, HttpPaymentGateway,
    PaymentGateway,
};

/// Keep upstream bodies readable in logs and error messages.
pub(crate) fn truncate_body(body: &str) -> String {
    body.chars().take(500).collect()
}
