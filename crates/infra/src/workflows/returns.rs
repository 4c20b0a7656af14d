use chrono::Utc;
use tracing::{info, warn};

use storefront_core::Amount;
use storefront_customers::CustomerId;
use storefront_inventory::StockDebit;
use storefront_payments::{Payment, PaymentCommand, RecordRefund as RecordPaymentRefund, RefundMethod, RefundStatus};
use storefront_returns::{
    build_return_lines, check_eligibility, ApproveReturn, RejectReturn, RequestReturn, ReturnCommand, ReturnId,
    ReturnLineRequest, ReturnRequest, ReturnStatus, UpdateRefund,
};
use storefront_sales::{Order, OrderCommand, OrderId, OrderStatus, RecordRefund, UpdateStatus};

use super::{Storefront, WorkflowError, WorkflowResult};
use crate::ledger::release_all;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateReturn {
    pub order_id: OrderId,
    pub items: Vec<ReturnLineRequest>,
    pub reason: String,
    pub description: Option<String>,
}

/// Admin update of a return's refund sub-state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundUpdate {
    pub status: RefundStatus,
    pub amount: Option<Amount>,
    pub method: Option<RefundMethod>,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReturnFilter {
    pub status: Option<ReturnStatus>,
}

impl Storefront {
    /// Open a return for a delivered order inside the return window.
    pub async fn create_return(&self, customer_id: CustomerId, request: CreateReturn) -> WorkflowResult<ReturnRequest> {
        if request.items.is_empty() || request.reason.trim().is_empty() {
            return Err(WorkflowError::validation("Order ID, items, and reason are required"));
        }

        let order = self.load_order(request.order_id).await?;
        // Not atomic with the create below; two racing requests can both pass.
        let has_open = self
            .return_store()
            .find_by_key(&request.order_id.to_string())
            .await?
            .iter()
            .any(|r| r.status().is_open());
        let now = Utc::now();
        check_eligibility(&order, customer_id, has_open, now)?;
        let (items, refund_amount) = build_return_lines(&order, &request.items)?;

        let return_number = self.sequence.next_return_number().await?;
        let return_id = ReturnId::generate();
        let created = self
            .returns
            .create(
                return_id.aggregate_id(),
                ReturnCommand::RequestReturn(RequestReturn {
                    return_id,
                    return_number: return_number.clone(),
                    order_id: request.order_id,
                    customer_id,
                    items,
                    reason: request.reason.trim().to_string(),
                    description: request.description.filter(|d| !d.trim().is_empty()),
                    refund_amount,
                    occurred_at: now,
                }),
                |id| ReturnRequest::empty(ReturnId::new(id)),
            )
            .await?
            .aggregate;
        info!(return_number = %return_number, order_number = order.order_number(), refund_amount, "return requested");

        Ok(created)
    }

    /// Approve a pending return and put the returned units back on sale.
    pub async fn approve_return(&self, return_id: ReturnId, admin_notes: Option<String>) -> WorkflowResult<ReturnRequest> {
        let approved = self
            .returns
            .dispatch::<ReturnRequest>(
                return_id.aggregate_id(),
                ReturnCommand::ApproveReturn(ApproveReturn { return_id, admin_notes, occurred_at: Utc::now() }),
            )
            .await?
            .aggregate;

        let restock: Vec<StockDebit> = approved.items().iter().map(|line| line.restock()).collect();
        release_all(self.ledger.as_ref(), &restock).await;
        info!(return_number = approved.return_number(), lines = restock.len(), "return approved, stock restored");

        Ok(approved)
    }

    pub async fn reject_return(&self, return_id: ReturnId, reason: Option<String>) -> WorkflowResult<ReturnRequest> {
        let rejected = self
            .returns
            .dispatch::<ReturnRequest>(
                return_id.aggregate_id(),
                ReturnCommand::RejectReturn(RejectReturn { return_id, reason, occurred_at: Utc::now() }),
            )
            .await?
            .aggregate;
        info!(return_number = rejected.return_number(), "return rejected");
        Ok(rejected)
    }

    /// Move the refund sub-state. Completing it completes the return, adds
    /// the amount to the order's payment and marks the order RETURNED.
    pub async fn update_return_refund(&self, return_id: ReturnId, update: RefundUpdate) -> WorkflowResult<ReturnRequest> {
        let now = Utc::now();
        let dispatched = self
            .returns
            .dispatch::<ReturnRequest>(
                return_id.aggregate_id(),
                ReturnCommand::UpdateRefund(UpdateRefund {
                    return_id,
                    status: update.status,
                    amount: update.amount,
                    method: update.method,
                    transaction_id: update.transaction_id.clone(),
                    occurred_at: now,
                }),
            )
            .await?;
        let request = dispatched.aggregate;

        if update.status == RefundStatus::Completed {
            if let Some(order_id) = request.order_id() {
                let amount = update.amount.unwrap_or(request.refund_amount());
                self.settle_return_refund(&request, order_id, amount, &update).await;
            }
        }

        Ok(request)
    }

    /// Follow-up writes on other aggregates; each is logged on failure and
    /// none undo the completed return.
    async fn settle_return_refund(&self, request: &ReturnRequest, order_id: OrderId, amount: Amount, update: &RefundUpdate) {
        let now = Utc::now();
        let refunded_total = match self.payment_for_order(order_id, None).await {
            Ok(Some(payment)) => {
                let result = self
                    .payments
                    .dispatch::<Payment>(
                        payment.id_typed().aggregate_id(),
                        PaymentCommand::RecordRefund(RecordPaymentRefund {
                            payment_id: payment.id_typed(),
                            status: RefundStatus::Completed,
                            amount,
                            transaction_id: update.transaction_id.clone(),
                            method: update.method.unwrap_or(RefundMethod::Original),
                            occurred_at: now,
                        }),
                    )
                    .await;
                match result {
                    Ok(d) => Some(d.aggregate.refund().amount),
                    Err(e) => {
                        warn!(return_number = request.return_number(), error = %e, "payment refund not recorded");
                        None
                    }
                }
            }
            Ok(None) => {
                warn!(return_number = request.return_number(), "no payment record for returned order");
                None
            }
            Err(e) => {
                warn!(return_number = request.return_number(), error = %e, "payment lookup failed");
                None
            }
        };

        if let Some(refunded_total) = refunded_total {
            let result = self
                .orders
                .dispatch::<Order>(
                    order_id.aggregate_id(),
                    OrderCommand::RecordRefund(RecordRefund { order_id, refunded_total, occurred_at: now }),
                )
                .await;
            if let Err(e) = result {
                warn!(return_number = request.return_number(), error = %e, "order refund not recorded");
            }
        }

        let result = self
            .orders
            .dispatch::<Order>(
                order_id.aggregate_id(),
                OrderCommand::UpdateStatus(UpdateStatus::to(order_id, OrderStatus::Returned, now)),
            )
            .await;
        match result {
            Ok(d) => info!(order_number = d.aggregate.order_number(), return_number = request.return_number(), "order returned"),
            Err(e) => warn!(return_number = request.return_number(), error = %e, "order not moved to RETURNED"),
        }
    }

    pub async fn get_return(&self, return_id: ReturnId, requester: Option<CustomerId>) -> WorkflowResult<ReturnRequest> {
        let request = self.load_return(return_id).await?;
        match (requester, request.customer_id()) {
            (Some(who), Some(owner)) if who != owner => Err(WorkflowError::Forbidden),
            _ => Ok(request),
        }
    }

    pub async fn list_customer_returns(&self, customer_id: CustomerId) -> WorkflowResult<Vec<ReturnRequest>> {
        Ok(self.return_store().list_by_owner(customer_id).await?)
    }

    pub async fn list_returns(&self, filter: ReturnFilter) -> WorkflowResult<Vec<ReturnRequest>> {
        let all = self.return_store().list_all().await?;
        Ok(all
            .into_iter()
            .filter(|r| filter.status.is_none_or(|s| r.status() == s))
            .collect())
    }
}
