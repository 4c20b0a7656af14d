//! Payments domain module.
//!
//! The payment record for an order (one per gateway), its refund sub-state,
//! and verification of gateway callback signatures.

pub mod payment;
pub mod signature;

pub use payment::{
    AttachGatewayOrder, Gateway, GatewayOrderAttached, OpenPayment, Payment, PaymentCommand,
    PaymentEvent, PaymentId, PaymentOpened, PaymentStatus, PaymentSucceeded, RecordPaymentSuccess,
    RecordRefund, Refund, RefundMethod, RefundRecorded, RefundStatus,
};
pub use signature::{sign, verify_signature};
