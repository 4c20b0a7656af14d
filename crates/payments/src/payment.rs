use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{Aggregate, AggregateRoot, Amount, DomainError};
use storefront_events::Event;
use storefront_sales::{OrderId, PaymentMethod};

storefront_core::typed_id!(PaymentId, "PaymentId");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gateway {
    Razorpay,
    Stripe,
    Paypal,
    Cod,
    Wallet,
}

impl Gateway {
    /// Gateway a new payment record starts on for a given method.
    pub fn for_method(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Cod => Gateway::Cod,
            PaymentMethod::Online => Gateway::Razorpay,
            PaymentMethod::Wallet => Gateway::Wallet,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
    PartiallyRefunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    #[default]
    None,
    Initiated,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundMethod {
    #[default]
    Original,
    Wallet,
}

/// Refund sub-state. `amount` is cumulative across completions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub status: RefundStatus,
    pub amount: Amount,
    pub transaction_id: Option<String>,
    pub method: RefundMethod,
    pub refunded_at: Option<DateTime<Utc>>,
}

/// Aggregate root: Payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    order_id: Option<OrderId>,
    amount: Amount,
    method: PaymentMethod,
    gateway: Gateway,
    status: PaymentStatus,
    gateway_order_id: Option<String>,
    transaction_id: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    refund: Refund,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Payment {
    pub fn empty(id: PaymentId) -> Self {
        Self {
            id,
            order_id: None,
            amount: 0,
            method: PaymentMethod::Cod,
            gateway: Gateway::Cod,
            status: PaymentStatus::Pending,
            gateway_order_id: None,
            transaction_id: None,
            paid_at: None,
            refund: Refund::default(),
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PaymentId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn gateway(&self) -> Gateway {
        self.gateway
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn gateway_order_id(&self) -> Option<&str> {
        self.gateway_order_id.as_deref()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn refund(&self) -> &Refund {
        &self.refund
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// A full refund already went through; repeating it must do nothing.
    pub fn is_refund_settled(&self) -> bool {
        self.status == PaymentStatus::Refunded || self.refund.status == RefundStatus::Completed
    }

    /// A gateway refund has been claimed and not yet settled or failed.
    pub fn is_refund_in_flight(&self) -> bool {
        self.refund.status == RefundStatus::Initiated
    }

    /// Amount still refundable against the captured payment.
    pub fn refundable(&self) -> Amount {
        self.amount.saturating_sub(self.refund.amount)
    }
}

impl AggregateRoot for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenPayment (created alongside the order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPayment {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub amount: Amount,
    pub method: PaymentMethod,
    pub gateway: Gateway,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachGatewayOrder (payment intent created at the gateway).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachGatewayOrder {
    pub payment_id: PaymentId,
    pub gateway: Gateway,
    pub gateway_order_id: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPaymentSuccess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPaymentSuccess {
    pub payment_id: PaymentId,
    pub method: PaymentMethod,
    pub gateway_order_id: Option<String>,
    pub transaction_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordRefund.
///
/// `status = Completed` adds `amount` to the refunded total. Other statuses
/// only move the refund sub-state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRefund {
    pub payment_id: PaymentId,
    pub status: RefundStatus,
    pub amount: Amount,
    pub transaction_id: Option<String>,
    pub method: RefundMethod,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentCommand {
    OpenPayment(OpenPayment),
    AttachGatewayOrder(AttachGatewayOrder),
    RecordPaymentSuccess(RecordPaymentSuccess),
    RecordRefund(RecordRefund),
}

/// Event: PaymentOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOpened {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub amount: Amount,
    pub method: PaymentMethod,
    pub gateway: Gateway,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GatewayOrderAttached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrderAttached {
    pub payment_id: PaymentId,
    pub gateway: Gateway,
    pub gateway_order_id: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentSucceeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSucceeded {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub gateway_order_id: Option<String>,
    pub transaction_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RefundRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRecorded {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub refund_status: RefundStatus,
    pub amount: Amount,
    pub refunded_total: Amount,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub method: RefundMethod,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEvent {
    PaymentOpened(PaymentOpened),
    GatewayOrderAttached(GatewayOrderAttached),
    PaymentSucceeded(PaymentSucceeded),
    RefundRecorded(RefundRecorded),
}

impl Event for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentOpened(_) => "payments.payment.opened",
            PaymentEvent::GatewayOrderAttached(_) => "payments.payment.gateway_order_attached",
            PaymentEvent::PaymentSucceeded(_) => "payments.payment.succeeded",
            PaymentEvent::RefundRecorded(_) => "payments.payment.refund_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PaymentEvent::PaymentOpened(e) => e.occurred_at,
            PaymentEvent::GatewayOrderAttached(e) => e.occurred_at,
            PaymentEvent::PaymentSucceeded(e) => e.occurred_at,
            PaymentEvent::RefundRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Payment {
    type Command = PaymentCommand;
    type Event = PaymentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PaymentEvent::PaymentOpened(e) => {
                self.id = e.payment_id;
                self.order_id = Some(e.order_id);
                self.amount = e.amount;
                self.method = e.method;
                self.gateway = e.gateway;
                self.status = PaymentStatus::Pending;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            PaymentEvent::GatewayOrderAttached(e) => {
                self.gateway = e.gateway;
                self.gateway_order_id = Some(e.gateway_order_id.clone());
            }
            PaymentEvent::PaymentSucceeded(e) => {
                self.status = PaymentStatus::Success;
                self.method = e.method;
                if e.gateway_order_id.is_some() {
                    self.gateway_order_id = e.gateway_order_id.clone();
                }
                self.transaction_id = e.transaction_id.clone();
                self.paid_at = Some(e.occurred_at);
            }
            PaymentEvent::RefundRecorded(e) => {
                self.refund.status = e.refund_status;
                self.refund.amount = e.refunded_total;
                self.refund.method = e.method;
                if e.transaction_id.is_some() {
                    self.refund.transaction_id = e.transaction_id.clone();
                }
                if e.refund_status == RefundStatus::Completed {
                    self.refund.refunded_at = Some(e.occurred_at);
                }
                self.status = e.payment_status;
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PaymentCommand::OpenPayment(cmd) => self.handle_open(cmd),
            PaymentCommand::AttachGatewayOrder(cmd) => self.handle_attach(cmd),
            PaymentCommand::RecordPaymentSuccess(cmd) => self.handle_success(cmd),
            PaymentCommand::RecordRefund(cmd) => self.handle_refund(cmd),
        }
    }
}

impl Payment {
    fn ensure_exists(&self, payment_id: PaymentId) -> Result<OrderId, DomainError> {
        match self.order_id {
            Some(order_id) if self.created && self.id == payment_id => Ok(order_id),
            Some(_) if self.created => Err(DomainError::invariant("payment_id mismatch")),
            _ => Err(DomainError::not_found()),
        }
    }

    fn handle_open(&self, cmd: &OpenPayment) -> Result<Vec<PaymentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("payment already exists"));
        }
        Ok(vec![PaymentEvent::PaymentOpened(PaymentOpened {
            payment_id: cmd.payment_id,
            order_id: cmd.order_id,
            amount: cmd.amount,
            method: cmd.method,
            gateway: cmd.gateway,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_attach(&self, cmd: &AttachGatewayOrder) -> Result<Vec<PaymentEvent>, DomainError> {
        self.ensure_exists(cmd.payment_id)?;
        if self.status != PaymentStatus::Pending && self.status != PaymentStatus::Failed {
            return Err(DomainError::validation("Order is already paid"));
        }
        if cmd.gateway_order_id.trim().is_empty() {
            return Err(DomainError::validation("gateway order id is required"));
        }
        Ok(vec![PaymentEvent::GatewayOrderAttached(GatewayOrderAttached {
            payment_id: cmd.payment_id,
            gateway: cmd.gateway,
            gateway_order_id: cmd.gateway_order_id.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_success(&self, cmd: &RecordPaymentSuccess) -> Result<Vec<PaymentEvent>, DomainError> {
        let order_id = self.ensure_exists(cmd.payment_id)?;
        match self.status {
            PaymentStatus::Pending | PaymentStatus::Failed => {}
            PaymentStatus::Success if self.transaction_id == cmd.transaction_id => return Ok(Vec::new()),
            PaymentStatus::Success => {
                return Err(DomainError::conflict("payment already captured with a different transaction"));
            }
            PaymentStatus::Refunded | PaymentStatus::PartiallyRefunded => {
                return Err(DomainError::invariant("payment has been refunded"));
            }
        }
        Ok(vec![PaymentEvent::PaymentSucceeded(PaymentSucceeded {
            payment_id: cmd.payment_id,
            order_id,
            method: cmd.method,
            gateway_order_id: cmd.gateway_order_id.clone(),
            transaction_id: cmd.transaction_id.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_refund(&self, cmd: &RecordRefund) -> Result<Vec<PaymentEvent>, DomainError> {
        let order_id = self.ensure_exists(cmd.payment_id)?;
        if !matches!(self.status, PaymentStatus::Success | PaymentStatus::PartiallyRefunded) {
            return Err(DomainError::invariant(format!(
                "cannot refund a payment in status {:?}",
                self.status
            )));
        }
        if cmd.status == RefundStatus::Initiated && self.is_refund_in_flight() {
            return Err(DomainError::conflict("refund already in progress"));
        }

        let (refunded_total, payment_status) = if cmd.status == RefundStatus::Completed {
            if cmd.amount == 0 {
                return Err(DomainError::validation("refund amount must be positive"));
            }
            let total = self.refund.amount.saturating_add(cmd.amount);
            let status = if total >= self.amount {
                PaymentStatus::Refunded
            } else {
                PaymentStatus::PartiallyRefunded
            };
            (total, status)
        } else {
            (self.refund.amount, self.status)
        };

        Ok(vec![PaymentEvent::RefundRecorded(RefundRecorded {
            payment_id: cmd.payment_id,
            order_id,
            refund_status: cmd.status,
            amount: cmd.amount,
            refunded_total,
            payment_status,
            transaction_id: cmd.transaction_id.clone(),
            method: cmd.method,
            occurred_at: cmd.occurred_at,
        })])
    }
}
