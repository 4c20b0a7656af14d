use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{Aggregate, AggregateRoot, Amount, DomainError};
use storefront_customers::CustomerId;
use storefront_events::Event;

use crate::line::{LineItem, ShippingAddress};
use crate::status::{OrderStatus, PaymentMethod, PaymentStatus};

storefront_core::typed_id!(OrderId, "OrderId");

/// Carrier name recorded when the courier aggregator does not supply one.
pub const DEFAULT_CARRIER: &str = "Courier";

/// Totals computed at placement. Never recomputed afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Amount,
    pub shipping_charges: Amount,
    pub discount: Amount,
    pub tax: Amount,
    pub total: Amount,
}

impl OrderTotals {
    /// `max(0, subtotal - discount + shipping) + tax`.
    pub fn expected_total(&self) -> Amount {
        (self.subtotal + self.shipping_charges).saturating_sub(self.discount) + self.tax
    }
}

/// Correlation with the courier aggregator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentInfo {
    pub external_order_id: Option<String>,
    pub external_shipment_id: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
}

impl ShipmentInfo {
    pub fn is_handed_over(&self) -> bool {
        self.external_order_id.is_some()
    }

    pub fn has_tracking(&self) -> bool {
        self.tracking_number.is_some()
    }
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    order_number: String,
    customer_id: Option<CustomerId>,
    items: Vec<LineItem>,
    shipping_address: Option<ShippingAddress>,
    totals: OrderTotals,
    coupon_code: Option<String>,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    status: OrderStatus,
    shipment: ShipmentInfo,
    notes: Option<String>,
    internal_notes: Option<String>,
    cancelled_reason: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-placed aggregate instance.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            order_number: String::new(),
            customer_id: None,
            items: Vec::new(),
            shipping_address: None,
            totals: OrderTotals::default(),
            coupon_code: None,
            payment_method: PaymentMethod::Cod,
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::Pending,
            shipment: ShipmentInfo::default(),
            notes: None,
            internal_notes: None,
            cancelled_reason: None,
            created_at: None,
            updated_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
            paid_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn belongs_to(&self, customer_id: CustomerId) -> bool {
        self.customer_id == Some(customer_id)
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn item(&self, line_id: crate::line::LineItemId) -> Option<&LineItem> {
        self.items.iter().find(|l| l.line_id == line_id)
    }

    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|l| l.quantity).sum()
    }

    pub fn shipping_address(&self) -> Option<&ShippingAddress> {
        self.shipping_address.as_ref()
    }

    pub fn totals(&self) -> &OrderTotals {
        &self.totals
    }

    pub fn total(&self) -> Amount {
        self.totals.total
    }

    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon_code.as_deref()
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn shipment(&self) -> &ShipmentInfo {
        &self.shipment
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn internal_notes(&self) -> Option<&str> {
        self.internal_notes.as_deref()
    }

    pub fn cancelled_reason(&self) -> Option<&str> {
        self.cancelled_reason.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    /// Paid online and not yet (fully) refunded.
    pub fn needs_gateway_refund(&self) -> bool {
        self.payment_method == PaymentMethod::Online && self.payment_status == PaymentStatus::Paid
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub totals: OrderTotals,
    pub coupon_code: Option<String>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateStatus (admin or workflow driven).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub shipping_provider: Option<String>,
    pub cancelled_reason: Option<String>,
    pub notes: Option<String>,
    pub internal_notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl UpdateStatus {
    pub fn to(order_id: OrderId, status: OrderStatus, occurred_at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            status,
            tracking_number: None,
            shipping_provider: None,
            cancelled_reason: None,
            notes: None,
            internal_notes: None,
            occurred_at,
        }
    }
}

/// Command: RecordExternalShipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordExternalShipment {
    pub order_id: OrderId,
    pub external_order_id: Option<String>,
    pub external_shipment_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdoptTracking (courier assigned an AWB).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdoptTracking {
    pub order_id: OrderId,
    pub tracking_number: String,
    pub carrier: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkPaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPaid {
    pub order_id: OrderId,
    /// `Cod` for the manual admin path, `Online` for a verified gateway payment.
    pub method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordRefund. `refunded_total` is the cumulative refunded amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRefund {
    pub order_id: OrderId,
    pub refunded_total: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    UpdateStatus(UpdateStatus),
    RecordExternalShipment(RecordExternalShipment),
    AdoptTracking(AdoptTracking),
    MarkPaid(MarkPaid),
    RecordRefund(RecordRefund),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub totals: OrderTotals,
    pub coupon_code: Option<String>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub order_id: OrderId,
    pub order_number: String,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub cancelled_reason: Option<String>,
    pub notes: Option<String>,
    pub internal_notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ExternalShipmentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalShipmentRecorded {
    pub order_id: OrderId,
    pub external_order_id: Option<String>,
    pub external_shipment_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TrackingAdopted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingAdopted {
    pub order_id: OrderId,
    pub order_number: String,
    pub tracking_number: String,
    pub carrier: String,
    pub previous_status: OrderStatus,
    /// True when adoption moved the order to `Shipped`.
    pub shipped: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceived {
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RefundRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRecorded {
    pub order_id: OrderId,
    pub refunded_total: Amount,
    pub payment_status: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    StatusChanged(StatusChanged),
    ExternalShipmentRecorded(ExternalShipmentRecorded),
    TrackingAdopted(TrackingAdopted),
    PaymentReceived(PaymentReceived),
    RefundRecorded(RefundRecorded),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "sales.order.placed",
            OrderEvent::StatusChanged(_) => "sales.order.status_changed",
            OrderEvent::ExternalShipmentRecorded(_) => "sales.order.external_shipment_recorded",
            OrderEvent::TrackingAdopted(_) => "sales.order.tracking_adopted",
            OrderEvent::PaymentReceived(_) => "sales.order.payment_received",
            OrderEvent::RefundRecorded(_) => "sales.order.refund_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::StatusChanged(e) => e.occurred_at,
            OrderEvent::ExternalShipmentRecorded(e) => e.occurred_at,
            OrderEvent::TrackingAdopted(e) => e.occurred_at,
            OrderEvent::PaymentReceived(e) => e.occurred_at,
            OrderEvent::RefundRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.order_number = e.order_number.clone();
                self.customer_id = Some(e.customer_id);
                self.items = e.items.clone();
                self.shipping_address = Some(e.shipping_address.clone());
                self.totals = e.totals;
                self.coupon_code = e.coupon_code.clone();
                self.payment_method = e.payment_method;
                self.payment_status = PaymentStatus::Pending;
                self.status = OrderStatus::Pending;
                self.notes = e.notes.clone();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
                match e.to {
                    OrderStatus::Shipped => {
                        self.shipped_at = Some(e.occurred_at);
                        if let Some(awb) = &e.tracking_number {
                            self.shipment.tracking_number = Some(awb.clone());
                        }
                        if let Some(carrier) = &e.carrier {
                            self.shipment.carrier = Some(carrier.clone());
                        }
                    }
                    OrderStatus::Delivered => self.delivered_at = Some(e.occurred_at),
                    OrderStatus::Cancelled => {
                        self.cancelled_at = Some(e.occurred_at);
                        self.cancelled_reason = e.cancelled_reason.clone();
                    }
                    _ => {}
                }
                if e.notes.is_some() {
                    self.notes = e.notes.clone();
                }
                if e.internal_notes.is_some() {
                    self.internal_notes = e.internal_notes.clone();
                }
            }
            OrderEvent::ExternalShipmentRecorded(e) => {
                if e.external_order_id.is_some() {
                    self.shipment.external_order_id = e.external_order_id.clone();
                }
                if e.external_shipment_id.is_some() {
                    self.shipment.external_shipment_id = e.external_shipment_id.clone();
                }
            }
            OrderEvent::TrackingAdopted(e) => {
                self.shipment.tracking_number = Some(e.tracking_number.clone());
                self.shipment.carrier = Some(e.carrier.clone());
                if e.shipped {
                    self.status = OrderStatus::Shipped;
                    self.shipped_at = Some(e.occurred_at);
                }
            }
            OrderEvent::PaymentReceived(e) => {
                self.payment_status = PaymentStatus::Paid;
                self.payment_method = e.method;
                self.paid_at = Some(e.occurred_at);
            }
            OrderEvent::RefundRecorded(e) => {
                self.payment_status = e.payment_status;
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::UpdateStatus(cmd) => self.handle_update_status(cmd),
            OrderCommand::RecordExternalShipment(cmd) => self.handle_record_external(cmd),
            OrderCommand::AdoptTracking(cmd) => self.handle_adopt_tracking(cmd),
            OrderCommand::MarkPaid(cmd) => self.handle_mark_paid(cmd),
            OrderCommand::RecordRefund(cmd) => self.handle_record_refund(cmd),
        }
    }
}

impl Order {
    fn ensure_exists(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.order_number.trim().is_empty() {
            return Err(DomainError::validation("order number is required"));
        }
        if cmd.items.is_empty() {
            return Err(DomainError::validation("Order must contain at least one item"));
        }
        if cmd.shipping_address.email.trim().is_empty() {
            return Err(DomainError::validation("Shipping address with email is required"));
        }
        for (idx, line) in cmd.items.iter().enumerate() {
            if line.quantity == 0 {
                return Err(DomainError::validation(format!(
                    "Item {}: quantity must be at least 1",
                    idx + 1
                )));
            }
        }

        let subtotal: Amount = cmd.items.iter().map(LineItem::total).sum();
        if subtotal != cmd.totals.subtotal {
            return Err(DomainError::invariant(format!(
                "subtotal {} does not match line totals {}",
                cmd.totals.subtotal, subtotal
            )));
        }
        if cmd.totals.discount > cmd.totals.subtotal {
            return Err(DomainError::invariant("discount exceeds subtotal"));
        }
        if cmd.totals.total != cmd.totals.expected_total() {
            return Err(DomainError::invariant(format!(
                "total {} does not match pricing formula {}",
                cmd.totals.total,
                cmd.totals.expected_total()
            )));
        }

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            customer_id: cmd.customer_id,
            items: cmd.items.clone(),
            shipping_address: cmd.shipping_address.clone(),
            totals: cmd.totals,
            coupon_code: cmd.coupon_code.clone(),
            payment_method: cmd.payment_method,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_status(&self, cmd: &UpdateStatus) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if !self.status.can_transition_to(cmd.status) {
            return Err(DomainError::invariant(format!(
                "cannot change order status from {} to {}",
                self.status, cmd.status
            )));
        }

        let shipping = cmd.status == OrderStatus::Shipped;
        let tracking_number = cmd
            .tracking_number
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| shipping && !s.is_empty());
        let carrier = cmd
            .shipping_provider
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| shipping && !s.is_empty());
        let cancelled_reason = (cmd.status == OrderStatus::Cancelled)
            .then(|| cmd.cancelled_reason.clone().unwrap_or_default());

        Ok(vec![OrderEvent::StatusChanged(StatusChanged {
            order_id: cmd.order_id,
            order_number: self.order_number.clone(),
            from: self.status,
            to: cmd.status,
            tracking_number,
            carrier,
            cancelled_reason,
            notes: cmd.notes.clone(),
            internal_notes: cmd.internal_notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_external(&self, cmd: &RecordExternalShipment) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        let unchanged = cmd.external_order_id.as_ref().is_none_or(|id| self.shipment.external_order_id.as_ref() == Some(id))
            && cmd.external_shipment_id.as_ref().is_none_or(|id| self.shipment.external_shipment_id.as_ref() == Some(id));
        if unchanged {
            return Ok(Vec::new());
        }

        Ok(vec![OrderEvent::ExternalShipmentRecorded(ExternalShipmentRecorded {
            order_id: cmd.order_id,
            external_order_id: cmd.external_order_id.clone(),
            external_shipment_id: cmd.external_shipment_id.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    /// First tracking number wins; later adoptions are no-ops.
    fn handle_adopt_tracking(&self, cmd: &AdoptTracking) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        let awb = cmd.tracking_number.trim();
        if awb.is_empty() {
            return Err(DomainError::validation("tracking number is required"));
        }
        if !self.status.accepts_tracking() {
            return Err(DomainError::invariant(format!(
                "cannot record tracking for a {} order",
                self.status
            )));
        }
        if self.shipment.has_tracking() {
            return Ok(Vec::new());
        }

        let carrier = cmd
            .carrier
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CARRIER)
            .to_string();

        Ok(vec![OrderEvent::TrackingAdopted(TrackingAdopted {
            order_id: cmd.order_id,
            order_number: self.order_number.clone(),
            tracking_number: awb.to_string(),
            carrier,
            previous_status: self.status,
            shipped: self.status.ships_on_tracking(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_paid(&self, cmd: &MarkPaid) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        match cmd.method {
            PaymentMethod::Cod if self.payment_method != PaymentMethod::Cod => {
                return Err(DomainError::validation(
                    "Only COD orders can be marked as paid manually",
                ));
            }
            PaymentMethod::Wallet => {
                return Err(DomainError::validation("wallet payments are not supported"));
            }
            _ => {}
        }

        match self.payment_status {
            PaymentStatus::Pending | PaymentStatus::Failed => {}
            PaymentStatus::Paid if self.payment_method == cmd.method => return Ok(Vec::new()),
            other => {
                return Err(DomainError::conflict(format!(
                    "order payment is already {other:?}"
                )));
            }
        }

        if matches!(self.status, OrderStatus::Cancelled | OrderStatus::Returned) {
            return Err(DomainError::invariant(format!(
                "cannot take payment for a {} order",
                self.status
            )));
        }

        Ok(vec![OrderEvent::PaymentReceived(PaymentReceived {
            order_id: cmd.order_id,
            method: cmd.method,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_refund(&self, cmd: &RecordRefund) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if self.payment_status == PaymentStatus::Refunded {
            return Ok(Vec::new());
        }
        if !matches!(self.payment_status, PaymentStatus::Paid | PaymentStatus::PartiallyRefunded) {
            return Err(DomainError::invariant("only paid orders can be refunded"));
        }
        if cmd.refunded_total == 0 {
            return Err(DomainError::validation("refund amount must be positive"));
        }

        let payment_status = if cmd.refunded_total >= self.totals.total {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };

        Ok(vec![OrderEvent::RefundRecorded(RefundRecorded {
            order_id: cmd.order_id,
            refunded_total: cmd.refunded_total,
            payment_status,
            occurred_at: cmd.occurred_at,
        })])
    }
}
