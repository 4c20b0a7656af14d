use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use storefront_core::money::to_minor_units;
use storefront_core::Amount;
use storefront_customers::CustomerId;
use storefront_payments::{
    AttachGatewayOrder, Gateway, OpenPayment, Payment, PaymentCommand, PaymentId, RecordPaymentSuccess,
    RecordRefund as RecordPaymentRefund, RefundMethod, RefundStatus,
};
use storefront_sales::{MarkPaid, Order, OrderCommand, OrderId, PaymentMethod, PaymentStatus, RecordRefund};

use super::{Storefront, WorkflowError, WorkflowResult};
use crate::external::CreateGatewayOrder;

/// What the browser checkout needs to open the gateway widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntent {
    pub key_id: String,
    pub gateway_order_id: String,
    /// Minor units.
    pub amount: u64,
    pub currency: String,
    pub order_id: OrderId,
    pub order_number: String,
}

/// Gateway checkout callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentVerification {
    pub order_id: Option<OrderId>,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
    Refunded { amount: Amount, refund_id: String },
    /// Nothing to do; the reason is logged.
    Skipped(&'static str),
}

impl Storefront {
    /// Open (or reopen) a gateway order for an unpaid order.
    pub async fn create_intent(&self, order_id: OrderId, requester: Option<CustomerId>) -> WorkflowResult<PaymentIntent> {
        let order = self.get_order(order_id, requester).await?;
        if order.payment_status() == PaymentStatus::Paid {
            return Err(WorkflowError::validation("Order is already paid"));
        }
        if !self.gateway.is_configured() {
            return Err(WorkflowError::NotConfigured("payment gateway"));
        }

        let currency = self.gateway.currency().to_string();
        let request = CreateGatewayOrder::for_order(order.total(), &currency, order_id, order.order_number());
        let gateway_order = self.gateway.create_order(&request).await?;

        let payment = self.ensure_payment(&order, Gateway::Razorpay).await?;
        self.payments
            .dispatch::<Payment>(
                payment.id_typed().aggregate_id(),
                PaymentCommand::AttachGatewayOrder(AttachGatewayOrder {
                    payment_id: payment.id_typed(),
                    gateway: Gateway::Razorpay,
                    gateway_order_id: gateway_order.id.clone(),
                    occurred_at: Utc::now(),
                }),
            )
            .await?;
        info!(order_number = order.order_number(), gateway_order_id = %gateway_order.id, "payment intent created");

        Ok(PaymentIntent {
            key_id: self.gateway.key_id().unwrap_or_default().to_string(),
            gateway_order_id: gateway_order.id,
            amount: request.amount,
            currency,
            order_id,
            order_number: order.order_number().to_string(),
        })
    }

    /// Check a gateway callback and record the payment. A bad signature is
    /// always a hard rejection.
    pub async fn verify_payment(&self, verification: PaymentVerification) -> WorkflowResult<Order> {
        let order_id = verification
            .order_id
            .ok_or_else(|| WorkflowError::validation("Missing payment verification details"))?;
        if [&verification.gateway_order_id, &verification.gateway_payment_id, &verification.signature]
            .iter()
            .any(|v| v.trim().is_empty())
        {
            return Err(WorkflowError::validation("Missing payment verification details"));
        }

        let valid = self.gateway.verify(
            &verification.gateway_order_id,
            &verification.gateway_payment_id,
            &verification.signature,
        )?;
        if !valid {
            warn!(%order_id, gateway_order_id = %verification.gateway_order_id, "payment signature mismatch");
            return Err(WorkflowError::validation("Invalid payment signature"));
        }

        // The signed gateway order must be the one opened for this order.
        let payment = self.payment_for_order(order_id, Some(Gateway::Razorpay)).await?;
        let Some(payment) = payment.filter(|p| p.gateway_order_id() == Some(verification.gateway_order_id.as_str()))
        else {
            warn!(%order_id, gateway_order_id = %verification.gateway_order_id, "gateway order does not belong to this order");
            return Err(WorkflowError::validation("Payment does not match this order"));
        };

        let now = Utc::now();
        let order = self
            .orders
            .dispatch::<Order>(
                order_id.aggregate_id(),
                OrderCommand::MarkPaid(MarkPaid { order_id, method: PaymentMethod::Online, occurred_at: now }),
            )
            .await?
            .aggregate;

        self.payments
            .dispatch::<Payment>(
                payment.id_typed().aggregate_id(),
                PaymentCommand::RecordPaymentSuccess(RecordPaymentSuccess {
                    payment_id: payment.id_typed(),
                    method: PaymentMethod::Online,
                    gateway_order_id: Some(verification.gateway_order_id),
                    transaction_id: Some(verification.gateway_payment_id),
                    occurred_at: now,
                }),
            )
            .await?;
        info!(order_number = order.order_number(), "online payment verified");

        Ok(order)
    }

    /// Refund an online payment through the gateway. Repeating a settled
    /// refund does nothing.
    pub async fn refund_order(&self, order_id: OrderId) -> WorkflowResult<RefundOutcome> {
        let order = self.load_order(order_id).await?;
        if order.payment_status() == PaymentStatus::Refunded {
            return Ok(skip(&order, "order already refunded"));
        }
        if order.payment_method() != PaymentMethod::Online || order.payment_status() != PaymentStatus::Paid {
            return Err(WorkflowError::validation("Only paid online orders can be refunded"));
        }

        let Some(payment) = self.payment_for_order(order_id, Some(Gateway::Razorpay)).await? else {
            return Ok(skip(&order, "no payment record"));
        };
        if payment.is_refund_settled() {
            return Ok(skip(&order, "refund already completed"));
        }
        if payment.is_refund_in_flight() {
            return Ok(skip(&order, "refund already in progress"));
        }
        if !self.gateway.is_configured() {
            return Ok(skip(&order, "payment gateway not configured"));
        }
        let Some(transaction_id) = payment.transaction_id().map(str::to_string) else {
            return Ok(skip(&order, "payment has no transaction id"));
        };

        let amount = match payment.refundable() {
            0 => order.total(),
            n => n,
        };
        let idempotency_key = format!("rfnd-{}-{}", payment.id_typed(), payment.refund().amount);

        // Claim the refund before the gateway call; a concurrent caller loses here.
        let claim = self
            .payments
            .dispatch::<Payment>(
                payment.id_typed().aggregate_id(),
                refund_command(&payment, RefundStatus::Initiated, amount, None),
            )
            .await
            .map_err(WorkflowError::from);
        match claim {
            Ok(_) => {}
            Err(WorkflowError::Conflict(_)) => return Ok(skip(&order, "refund already in progress")),
            Err(e) => return Err(e),
        }

        let refund = match self.gateway.refund(&transaction_id, to_minor_units(amount), &idempotency_key).await {
            Ok(refund) => refund,
            Err(e) => {
                let released = self
                    .payments
                    .dispatch::<Payment>(
                        payment.id_typed().aggregate_id(),
                        refund_command(&payment, RefundStatus::Failed, amount, None),
                    )
                    .await;
                if let Err(release_err) = released {
                    warn!(order_number = order.order_number(), error = %release_err, "refund claim not released");
                }
                return Err(e.into());
            }
        };

        let updated = self
            .payments
            .dispatch::<Payment>(
                payment.id_typed().aggregate_id(),
                refund_command(&payment, RefundStatus::Completed, amount, Some(refund.id.clone())),
            )
            .await?
            .aggregate;
        let now = Utc::now();
        self.orders
            .dispatch::<Order>(
                order_id.aggregate_id(),
                OrderCommand::RecordRefund(RecordRefund {
                    order_id,
                    refunded_total: updated.refund().amount,
                    occurred_at: now,
                }),
            )
            .await?;
        info!(order_number = order.order_number(), amount, refund_id = %refund.id, "order refunded");

        Ok(RefundOutcome::Refunded { amount, refund_id: refund.id })
    }

    /// Record cash collected for a COD order.
    pub async fn mark_paid(&self, order_id: OrderId) -> WorkflowResult<Order> {
        let now = Utc::now();
        let order = self
            .orders
            .dispatch::<Order>(
                order_id.aggregate_id(),
                OrderCommand::MarkPaid(MarkPaid { order_id, method: PaymentMethod::Cod, occurred_at: now }),
            )
            .await?
            .aggregate;

        let payment = self.ensure_payment(&order, Gateway::Cod).await?;
        self.payments
            .dispatch::<Payment>(
                payment.id_typed().aggregate_id(),
                PaymentCommand::RecordPaymentSuccess(RecordPaymentSuccess {
                    payment_id: payment.id_typed(),
                    method: PaymentMethod::Cod,
                    gateway_order_id: None,
                    transaction_id: payment.transaction_id().map(str::to_string),
                    occurred_at: now,
                }),
            )
            .await?;
        info!(order_number = order.order_number(), "cod payment recorded");

        Ok(order)
    }

    /// The order's payment on `gateway`, opened now if checkout never wrote one.
    async fn ensure_payment(&self, order: &Order, gateway: Gateway) -> WorkflowResult<Payment> {
        if let Some(existing) = self.payment_for_order(order.id_typed(), Some(gateway)).await? {
            return Ok(existing);
        }
        let payment_id = PaymentId::generate();
        let opened = self
            .payments
            .create(
                payment_id.aggregate_id(),
                PaymentCommand::OpenPayment(OpenPayment {
                    payment_id,
                    order_id: order.id_typed(),
                    amount: order.total(),
                    method: order.payment_method(),
                    gateway,
                    occurred_at: Utc::now(),
                }),
                |id| Payment::empty(PaymentId::new(id)),
            )
            .await?;
        Ok(opened.aggregate)
    }
}

fn refund_command(payment: &Payment, status: RefundStatus, amount: Amount, transaction_id: Option<String>) -> PaymentCommand {
    PaymentCommand::RecordRefund(RecordPaymentRefund {
        payment_id: payment.id_typed(),
        status,
        amount,
        transaction_id,
        method: RefundMethod::Original,
        occurred_at: Utc::now(),
    })
}

fn skip(order: &Order, reason: &'static str) -> RefundOutcome {
    info!(order_number = order.order_number(), reason, "refund skipped");
    RefundOutcome::Skipped(reason)
}
