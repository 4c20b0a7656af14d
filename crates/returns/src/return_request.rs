use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_catalog::ProductId;
use storefront_core::{Aggregate, AggregateRoot, Amount, DomainError};
use storefront_customers::CustomerId;
use storefront_events::Event;
use storefront_inventory::{StockDebit, StockSource};
use storefront_payments::{Refund, RefundMethod, RefundStatus};
use storefront_sales::{LineItemId, OrderId};

storefront_core::typed_id!(ReturnId, "ReturnId");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnStatus {
    Pending,
    Approved,
    Rejected,
    Processing,
    Completed,
}

impl ReturnStatus {
    /// Non-terminal returns block a second request for the same order.
    pub fn is_open(self) -> bool {
        matches!(self, ReturnStatus::Pending | ReturnStatus::Approved | ReturnStatus::Processing)
    }
}

impl core::str::FromStr for ReturnStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ReturnStatus::Pending),
            "APPROVED" => Ok(ReturnStatus::Approved),
            "REJECTED" => Ok(ReturnStatus::Rejected),
            "PROCESSING" => Ok(ReturnStatus::Processing),
            "COMPLETED" => Ok(ReturnStatus::Completed),
            other => Err(DomainError::validation(format!("unknown return status: {other}"))),
        }
    }
}

/// Snapshot of one returned order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLine {
    pub order_item_id: LineItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub size: Option<String>,
    pub reason: Option<String>,
    /// Stock counter the original order line reserved from.
    pub reserved_from: StockSource,
}

impl ReturnLine {
    pub fn restock(&self) -> StockDebit {
        StockDebit {
            product_id: self.product_id,
            source: self.reserved_from.clone(),
            quantity: self.quantity,
        }
    }
}

/// Aggregate root: ReturnRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    id: ReturnId,
    return_number: String,
    order_id: Option<OrderId>,
    customer_id: Option<CustomerId>,
    items: Vec<ReturnLine>,
    reason: String,
    description: Option<String>,
    refund_amount: Amount,
    status: ReturnStatus,
    refund: Refund,
    admin_notes: Option<String>,
    rejected_reason: Option<String>,
    created_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl ReturnRequest {
    pub fn empty(id: ReturnId) -> Self {
        Self {
            id,
            return_number: String::new(),
            order_id: None,
            customer_id: None,
            items: Vec::new(),
            reason: String::new(),
            description: None,
            refund_amount: 0,
            status: ReturnStatus::Pending,
            refund: Refund::default(),
            admin_notes: None,
            rejected_reason: None,
            created_at: None,
            approved_at: None,
            rejected_at: None,
            completed_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ReturnId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn return_number(&self) -> &str {
        &self.return_number
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn items(&self) -> &[ReturnLine] {
        &self.items
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn refund_amount(&self) -> Amount {
        self.refund_amount
    }

    pub fn status(&self) -> ReturnStatus {
        self.status
    }

    pub fn refund(&self) -> &Refund {
        &self.refund
    }

    pub fn admin_notes(&self) -> Option<&str> {
        self.admin_notes.as_deref()
    }

    pub fn rejected_reason(&self) -> Option<&str> {
        self.rejected_reason.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn rejected_at(&self) -> Option<DateTime<Utc>> {
        self.rejected_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}

impl AggregateRoot for ReturnRequest {
    type Id = ReturnId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RequestReturn. Lines and refund come from `build_return_lines`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestReturn {
    pub return_id: ReturnId,
    pub return_number: String,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub items: Vec<ReturnLine>,
    pub reason: String,
    pub description: Option<String>,
    pub refund_amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveReturn {
    pub return_id: ReturnId,
    pub admin_notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectReturn {
    pub return_id: ReturnId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateRefund. `amount` overrides the computed refund when given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRefund {
    pub return_id: ReturnId,
    pub status: RefundStatus,
    pub amount: Option<Amount>,
    pub method: Option<RefundMethod>,
    pub transaction_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnCommand {
    RequestReturn(RequestReturn),
    ApproveReturn(ApproveReturn),
    RejectReturn(RejectReturn),
    UpdateRefund(UpdateRefund),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequested {
    pub return_id: ReturnId,
    pub return_number: String,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub items: Vec<ReturnLine>,
    pub reason: String,
    pub description: Option<String>,
    pub refund_amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnApproved {
    pub return_id: ReturnId,
    pub order_id: OrderId,
    pub items: Vec<ReturnLine>,
    pub admin_notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRejected {
    pub return_id: ReturnId,
    pub order_id: OrderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundUpdated {
    pub return_id: ReturnId,
    pub order_id: OrderId,
    pub refund_status: RefundStatus,
    pub refund_amount: Amount,
    pub method: RefundMethod,
    pub transaction_id: Option<String>,
    /// Status the return moves to.
    pub status: ReturnStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnEvent {
    ReturnRequested(ReturnRequested),
    ReturnApproved(ReturnApproved),
    ReturnRejected(ReturnRejected),
    RefundUpdated(RefundUpdated),
}

impl Event for ReturnEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReturnEvent::ReturnRequested(_) => "returns.return.requested",
            ReturnEvent::ReturnApproved(_) => "returns.return.approved",
            ReturnEvent::ReturnRejected(_) => "returns.return.rejected",
            ReturnEvent::RefundUpdated(_) => "returns.return.refund_updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReturnEvent::ReturnRequested(e) => e.occurred_at,
            ReturnEvent::ReturnApproved(e) => e.occurred_at,
            ReturnEvent::ReturnRejected(e) => e.occurred_at,
            ReturnEvent::RefundUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ReturnRequest {
    type Command = ReturnCommand;
    type Event = ReturnEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReturnEvent::ReturnRequested(e) => {
                self.id = e.return_id;
                self.return_number = e.return_number.clone();
                self.order_id = Some(e.order_id);
                self.customer_id = Some(e.customer_id);
                self.items = e.items.clone();
                self.reason = e.reason.clone();
                self.description = e.description.clone();
                self.refund_amount = e.refund_amount;
                self.status = ReturnStatus::Pending;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            ReturnEvent::ReturnApproved(e) => {
                self.status = ReturnStatus::Approved;
                self.approved_at = Some(e.occurred_at);
                if e.admin_notes.is_some() {
                    self.admin_notes = e.admin_notes.clone();
                }
            }
            ReturnEvent::ReturnRejected(e) => {
                self.status = ReturnStatus::Rejected;
                self.rejected_at = Some(e.occurred_at);
                self.rejected_reason = Some(e.reason.clone());
            }
            ReturnEvent::RefundUpdated(e) => {
                self.refund.status = e.refund_status;
                self.refund.amount = e.refund_amount;
                self.refund.method = e.method;
                if e.transaction_id.is_some() {
                    self.refund.transaction_id = e.transaction_id.clone();
                }
                self.refund_amount = e.refund_amount;
                self.status = e.status;
                if e.status == ReturnStatus::Completed {
                    self.completed_at = Some(e.occurred_at);
                    self.refund.refunded_at = Some(e.occurred_at);
                }
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReturnCommand::RequestReturn(cmd) => self.handle_request(cmd),
            ReturnCommand::ApproveReturn(cmd) => self.handle_approve(cmd),
            ReturnCommand::RejectReturn(cmd) => self.handle_reject(cmd),
            ReturnCommand::UpdateRefund(cmd) => self.handle_update_refund(cmd),
        }
    }
}

impl ReturnRequest {
    fn ensure_exists(&self, return_id: ReturnId) -> Result<OrderId, DomainError> {
        match self.order_id {
            Some(order_id) if self.created && self.id == return_id => Ok(order_id),
            Some(_) if self.created => Err(DomainError::invariant("return_id mismatch")),
            _ => Err(DomainError::not_found()),
        }
    }

    fn ensure_pending(&self) -> Result<(), DomainError> {
        if self.status != ReturnStatus::Pending {
            return Err(DomainError::validation("Return request is not pending"));
        }
        Ok(())
    }

    fn handle_request(&self, cmd: &RequestReturn) -> Result<Vec<ReturnEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("return already exists"));
        }
        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation(
                "Order ID, at least one item, and reason are required",
            ));
        }
        if cmd.items.is_empty() || cmd.items.iter().any(|l| l.quantity == 0) {
            return Err(DomainError::validation(
                "Please select at least one item with quantity to return",
            ));
        }

        Ok(vec![ReturnEvent::ReturnRequested(ReturnRequested {
            return_id: cmd.return_id,
            return_number: cmd.return_number.clone(),
            order_id: cmd.order_id,
            customer_id: cmd.customer_id,
            items: cmd.items.clone(),
            reason: reason.to_string(),
            description: cmd
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            refund_amount: cmd.refund_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveReturn) -> Result<Vec<ReturnEvent>, DomainError> {
        let order_id = self.ensure_exists(cmd.return_id)?;
        self.ensure_pending()?;
        Ok(vec![ReturnEvent::ReturnApproved(ReturnApproved {
            return_id: cmd.return_id,
            order_id,
            items: self.items.clone(),
            admin_notes: cmd.admin_notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectReturn) -> Result<Vec<ReturnEvent>, DomainError> {
        let order_id = self.ensure_exists(cmd.return_id)?;
        self.ensure_pending()?;
        let reason = cmd
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or("Return request rejected")
            .to_string();
        Ok(vec![ReturnEvent::ReturnRejected(ReturnRejected {
            return_id: cmd.return_id,
            order_id,
            reason,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_refund(&self, cmd: &UpdateRefund) -> Result<Vec<ReturnEvent>, DomainError> {
        let order_id = self.ensure_exists(cmd.return_id)?;
        if !matches!(self.status, ReturnStatus::Approved | ReturnStatus::Processing) {
            return Err(DomainError::validation(format!(
                "cannot update the refund of a {:?} return",
                self.status
            )));
        }

        let status = match cmd.status {
            RefundStatus::Completed => ReturnStatus::Completed,
            RefundStatus::Initiated | RefundStatus::Processing => ReturnStatus::Processing,
            RefundStatus::Failed | RefundStatus::None => self.status,
        };
        let refund_amount = cmd.amount.unwrap_or(self.refund_amount);
        if status == ReturnStatus::Completed && refund_amount == 0 {
            return Err(DomainError::validation("refund amount must be positive"));
        }

        Ok(vec![ReturnEvent::RefundUpdated(RefundUpdated {
            return_id: cmd.return_id,
            order_id,
            refund_status: cmd.status,
            refund_amount,
            method: cmd.method.unwrap_or(self.refund.method),
            transaction_id: cmd.transaction_id.clone(),
            status,
            occurred_at: cmd.occurred_at,
        })])
    }
}
