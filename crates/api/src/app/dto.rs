use std::str::FromStr;

use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use storefront_catalog::ProductId;
use storefront_core::{Amount, DomainError};
use storefront_customers::CustomerId;
use storefront_infra::workflows::{
    CheckoutItem, CheckoutReceipt, CheckoutRequest, CouponCheck, CreateReturn, OrderFilter, PaymentVerification,
    RefundOutcome, RefundUpdate, ReturnFilter, StatusUpdate,
};
use storefront_payments::{RefundMethod, RefundStatus};
use storefront_returns::{ReturnLineRequest, ReturnStatus};
use storefront_sales::{AddressInput, LineItemId, OrderId, OrderStatus, PaymentMethod, PaymentStatus};

use crate::app::errors;

type Rejection = axum::response::Response;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CheckoutItemRequest {
    pub product_id: String,
    pub quantity: u32,
    pub size: Option<String>,
    pub color: Option<String>,
    pub price: Option<Amount>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub items: Vec<CheckoutItemRequest>,
    pub shipping_address: AddressInput,
    pub payment_method: String,
    pub coupon_code: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub subtotal: Amount,
    pub total_quantity: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub order_id: Option<String>,
    #[serde(alias = "razorpay_order_id")]
    pub gateway_order_id: String,
    #[serde(alias = "razorpay_payment_id")]
    pub gateway_payment_id: String,
    #[serde(alias = "razorpay_signature")]
    pub signature: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
    pub tracking_number: Option<String>,
    pub shipping_provider: Option<String>,
    pub cancelled_reason: Option<String>,
    pub notes: Option<String>,
    pub internal_notes: Option<String>,
    pub courier_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShipmentRequest {
    pub courier_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnItemRequest {
    pub order_item_id: String,
    pub quantity: Option<u32>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReturnRequest {
    pub order_id: String,
    #[serde(default)]
    pub items: Vec<ReturnItemRequest>,
    #[serde(default)]
    pub reason: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveReturnRequest {
    pub admin_notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectReturnRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnRefundRequest {
    pub status: RefundStatus,
    pub amount: Option<Amount>,
    pub method: Option<RefundMethod>,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
    pub payment_status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReturnListQuery {
    pub status: Option<ReturnStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeadLetterQuery {
    pub limit: Option<usize>,
}

// -------------------------
// Request mapping
// -------------------------

pub fn parse_id<T>(raw: &str, what: &str) -> Result<T, Rejection>
where
    T: FromStr<Err = DomainError>,
{
    raw.trim().parse().map_err(|_| errors::invalid_id(what))
}

fn parse_field<T>(raw: &str) -> Result<T, Rejection>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse()
        .map_err(|e: DomainError| errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()))
}

impl CreateOrderRequest {
    pub fn into_checkout(self, customer_id: Option<CustomerId>) -> Result<CheckoutRequest, Rejection> {
        let items = self
            .items
            .into_iter()
            .map(|item| {
                Ok(CheckoutItem {
                    product_id: parse_id::<ProductId>(&item.product_id, "product")?,
                    quantity: item.quantity,
                    size: item.size,
                    color: item.color,
                    price: item.price,
                })
            })
            .collect::<Result<Vec<_>, Rejection>>()?;

        Ok(CheckoutRequest {
            customer_id,
            items,
            shipping_address: self.shipping_address,
            payment_method: parse_field::<PaymentMethod>(&self.payment_method)?,
            coupon_code: self.coupon_code,
            notes: self.notes,
        })
    }
}

impl VerifyPaymentRequest {
    pub fn into_verification(self) -> Result<PaymentVerification, Rejection> {
        let order_id = match self.order_id.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(raw) => Some(parse_id::<OrderId>(raw, "order")?),
            None => None,
        };
        Ok(PaymentVerification {
            order_id,
            gateway_order_id: self.gateway_order_id,
            gateway_payment_id: self.gateway_payment_id,
            signature: self.signature,
        })
    }
}

impl UpdateStatusRequest {
    pub fn into_update(self) -> Result<StatusUpdate, Rejection> {
        let status = match self.status.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(raw) => Some(parse_field::<OrderStatus>(raw)?),
            None => None,
        };
        Ok(StatusUpdate {
            status,
            tracking_number: self.tracking_number,
            shipping_provider: self.shipping_provider,
            cancelled_reason: self.cancelled_reason,
            notes: self.notes,
            internal_notes: self.internal_notes,
            courier_id: self.courier_id,
        })
    }
}

impl CreateReturnRequest {
    pub fn into_command(self) -> Result<CreateReturn, Rejection> {
        let items = self
            .items
            .into_iter()
            .map(|item| {
                Ok(ReturnLineRequest {
                    order_item_id: parse_id::<LineItemId>(&item.order_item_id, "order item")?,
                    quantity: item.quantity,
                    reason: item.reason,
                })
            })
            .collect::<Result<Vec<_>, Rejection>>()?;

        Ok(CreateReturn {
            order_id: parse_id(&self.order_id, "order")?,
            items,
            reason: self.reason,
            description: self.description,
        })
    }
}

impl From<ReturnRefundRequest> for RefundUpdate {
    fn from(value: ReturnRefundRequest) -> Self {
        RefundUpdate {
            status: value.status,
            amount: value.amount,
            method: value.method,
            transaction_id: value.transaction_id,
        }
    }
}

impl OrderListQuery {
    pub fn into_filter(self) -> Result<OrderFilter, Rejection> {
        let status = match self.status.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => Some(parse_field::<OrderStatus>(raw)?),
            None => None,
        };
        let payment_status = match self.payment_status.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => Some(parse_field::<PaymentStatus>(raw)?),
            None => None,
        };
        Ok(OrderFilter { status, payment_status })
    }
}

impl From<ReturnListQuery> for ReturnFilter {
    fn from(value: ReturnListQuery) -> Self {
        ReturnFilter { status: value.status }
    }
}

// -------------------------
// Response mapping
// -------------------------

pub fn checkout_to_json(receipt: &CheckoutReceipt) -> Value {
    json!({
        "order": receipt.order,
        "payment": receipt.payment,
        "coupon": receipt.coupon,
    })
}

pub fn coupon_check_to_json(check: &CouponCheck) -> (StatusCode, Value) {
    match check {
        CouponCheck::Valid { code, discount } => (
            StatusCode::OK,
            json!({ "valid": true, "code": code, "discount": discount }),
        ),
        CouponCheck::Invalid { code, rejection } => (
            StatusCode::BAD_REQUEST,
            json!({
                "valid": false,
                "code": code,
                "error": "invalid_coupon",
                "reason": rejection.code(),
                "message": rejection.to_string(),
            }),
        ),
    }
}

pub fn refund_outcome_to_json(outcome: &RefundOutcome) -> Value {
    match outcome {
        RefundOutcome::Refunded { amount, refund_id } => {
            json!({ "refunded": true, "amount": amount, "refund_id": refund_id })
        }
        RefundOutcome::Skipped(reason) => json!({ "refunded": false, "reason": reason }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_update_parses_case_insensitively() {
        let update = UpdateStatusRequest { status: Some("confirmed".into()), ..Default::default() }
            .into_update()
            .unwrap();
        assert_eq!(update.status, Some(OrderStatus::Confirmed));

        let missing = UpdateStatusRequest::default().into_update().unwrap();
        assert_eq!(missing.status, None);

        let bad = UpdateStatusRequest { status: Some("teleported".into()), ..Default::default() }
            .into_update()
            .unwrap_err();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn verify_accepts_gateway_field_names() {
        let body: VerifyPaymentRequest = serde_json::from_value(json!({
            "razorpay_order_id": "order_1",
            "razorpay_payment_id": "pay_1",
            "razorpay_signature": "sig",
        }))
        .unwrap();
        let v = body.into_verification().unwrap();
        assert_eq!(v.order_id, None);
        assert_eq!(v.gateway_payment_id, "pay_1");
    }

    #[test]
    fn bad_product_id_is_rejected_before_checkout() {
        let body: CreateOrderRequest = serde_json::from_value(json!({
            "items": [{"product_id": "nope", "quantity": 1}],
            "shipping_address": {"first_name": "A", "last_name": "B", "email": "a@b.c", "phone": "1",
                                 "city": "X", "state": "Y", "pincode": "560001"},
            "payment_method": "cod",
        }))
        .unwrap();
        let err = body.into_checkout(None).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
