use chrono::Utc;
use futures::future::join_all;
use tracing::{info, warn};

use storefront_customers::CustomerId;
use storefront_inventory::StockDebit;
use storefront_sales::{Order, OrderCommand, OrderEvent, OrderId, OrderStatus, PaymentStatus, UpdateStatus};

use super::{Storefront, WorkflowError, WorkflowResult};
use crate::jobs::Job;
use crate::ledger::release_all;

/// Admin status change request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: Option<OrderStatus>,
    pub tracking_number: Option<String>,
    pub shipping_provider: Option<String>,
    pub cancelled_reason: Option<String>,
    pub notes: Option<String>,
    pub internal_notes: Option<String>,
    /// Preferred courier for the shipment created on confirmation.
    pub courier_id: Option<String>,
}

impl StatusUpdate {
    pub fn to(status: OrderStatus) -> Self {
        Self { status: Some(status), ..Self::default() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
}

impl OrderFilter {
    fn matches(&self, order: &Order) -> bool {
        self.status.is_none_or(|s| order.status() == s)
            && self.payment_status.is_none_or(|s| order.payment_status() == s)
    }
}

impl Storefront {
    /// Apply an admin status change and schedule its side effects.
    ///
    /// CONFIRMED queues shipment creation. CANCELLED puts every line's stock
    /// back and queues a gateway refund for orders paid online. Neither side
    /// effect can undo the status change. RETURNED is only reached through a
    /// completed return.
    pub async fn update_status(&self, order_id: OrderId, update: StatusUpdate) -> WorkflowResult<Order> {
        let status = update
            .status
            .ok_or_else(|| WorkflowError::validation("Status is required"))?;
        if status == OrderStatus::Returned {
            return Err(WorkflowError::InvalidTransition(
                "Orders move to RETURNED only when a return is completed".into(),
            ));
        }

        let command = UpdateStatus {
            order_id,
            status,
            tracking_number: update.tracking_number,
            shipping_provider: update.shipping_provider,
            cancelled_reason: update.cancelled_reason,
            notes: update.notes,
            internal_notes: update.internal_notes,
            occurred_at: Utc::now(),
        };
        let dispatched = self
            .orders
            .dispatch::<Order>(order_id.aggregate_id(), OrderCommand::UpdateStatus(command))
            .await?;
        let from = dispatched.events.iter().find_map(|event| match event {
            OrderEvent::StatusChanged(changed) => Some(changed.from),
            _ => None,
        });
        let order = dispatched.aggregate;
        match from {
            Some(from) => info!(order_number = order.order_number(), %from, to = %status, "order status updated"),
            None => info!(order_number = order.order_number(), to = %status, "order status unchanged"),
        }

        match status {
            OrderStatus::Confirmed => self.enqueue(Job::create_shipment(order_id, update.courier_id), &order),
            OrderStatus::Cancelled => {
                let debits: Vec<StockDebit> = order.items().iter().map(|line| line.debit()).collect();
                release_all(self.ledger.as_ref(), &debits).await;
                // Cancelling leaves payment state alone, so the saved order is authoritative.
                if order.needs_gateway_refund() {
                    self.enqueue(Job::refund(order_id), &order);
                }
            }
            _ => {}
        }

        Ok(order)
    }

    /// Load an order. With a `requester`, the order must be theirs.
    pub async fn get_order(&self, order_id: OrderId, requester: Option<CustomerId>) -> WorkflowResult<Order> {
        let order = self.load_order(order_id).await?;
        match requester {
            Some(customer) if !order.belongs_to(customer) => Err(WorkflowError::Forbidden),
            _ => Ok(order),
        }
    }

    /// A customer's orders, newest first. Orders handed to the courier but
    /// still without an AWB are reconciled first, concurrently and each
    /// bounded by the external timeout.
    pub async fn list_customer_orders(&self, customer_id: CustomerId) -> WorkflowResult<Vec<Order>> {
        let orders = self.order_store().list_by_owner(customer_id).await?;
        let timeout = self.settings.external_timeout;

        let refreshed = orders.into_iter().map(|order| async move {
            if order.shipment().has_tracking() || !order.shipment().is_handed_over() {
                return order;
            }
            let fallback = order.clone();
            match tokio::time::timeout(timeout, self.reconcile(order)).await {
                Ok(order) => order,
                Err(_) => {
                    warn!(order_number = fallback.order_number(), "tracking reconciliation timed out");
                    fallback
                }
            }
        });
        Ok(join_all(refreshed).await)
    }

    pub async fn list_orders(&self, filter: OrderFilter) -> WorkflowResult<Vec<Order>> {
        let orders = self.order_store().list_all().await?;
        Ok(orders.into_iter().filter(|o| filter.matches(o)).collect())
    }

    pub(crate) fn enqueue(&self, job: Job, order: &Order) {
        let kind = job.kind;
        match self.jobs.enqueue(job) {
            Ok(job_id) => info!(order_number = order.order_number(), %kind, %job_id, "job queued"),
            Err(e) => warn!(order_number = order.order_number(), %kind, error = %e, "failed to queue job"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::Aggregate;
    use storefront_sales::{MarkPaid, PaymentMethod};

    use crate::jobs::JobKind;
    use crate::workflows::fakes::{Harness, RacingStore};

    fn queued(h: &Harness) -> Vec<JobKind> {
        let mut kinds = Vec::new();
        while let Ok(Some(job)) = h.storefront.jobs().claim_next() {
            kinds.push(job.kind);
        }
        kinds
    }

    #[tokio::test]
    async fn confirming_queues_shipment_creation() {
        let h = Harness::new();
        let order = h.place_order(PaymentMethod::Cod).await;

        let confirmed = h.advance(&order, OrderStatus::Confirmed).await;
        assert_eq!(confirmed.status(), OrderStatus::Confirmed);
        assert_eq!(queued(&h), vec![JobKind::CreateShipment]);
    }

    #[tokio::test]
    async fn cancelling_restores_stock_once() {
        let h = Harness::new();
        let order = h.place_order(PaymentMethod::Cod).await;
        let product = order.items()[0].product_id;
        assert_eq!(h.stock(product).await.stock_quantity, 8);

        let mut update = StatusUpdate::to(OrderStatus::Cancelled);
        update.cancelled_reason = Some("changed my mind".into());
        let cancelled = h.storefront.update_status(order.id_typed(), update).await.unwrap();
        assert_eq!(cancelled.cancelled_reason(), Some("changed my mind"));
        assert_eq!(h.stock(product).await.stock_quantity, 10);

        let err = h
            .storefront
            .update_status(order.id_typed(), StatusUpdate::to(OrderStatus::Cancelled))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition(_)));
        assert_eq!(h.stock(product).await.stock_quantity, 10);
        assert!(queued(&h).is_empty());
    }

    #[tokio::test]
    async fn cancelling_a_paid_online_order_queues_refund() {
        let h = Harness::new();
        let order = h.place_order(PaymentMethod::Online).await;
        h.storefront
            .orders
            .dispatch::<Order>(
                order.id_typed().aggregate_id(),
                OrderCommand::MarkPaid(MarkPaid { order_id: order.id_typed(), method: PaymentMethod::Online, occurred_at: Utc::now() }),
            )
            .await
            .unwrap();

        h.advance(&order, OrderStatus::Cancelled).await;
        assert_eq!(queued(&h), vec![JobKind::Refund]);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let h = Harness::new();
        let order = h.place_order(PaymentMethod::Cod).await;
        let err = h
            .storefront
            .update_status(order.id_typed(), StatusUpdate::to(OrderStatus::Delivered))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition(msg) if msg.contains("PENDING")));
    }

    #[tokio::test]
    async fn returned_cannot_be_set_by_hand() {
        let h = Harness::new();
        let order = h.place_order(PaymentMethod::Cod).await;
        for status in [OrderStatus::Confirmed, OrderStatus::Shipped, OrderStatus::Delivered] {
            h.advance(&order, status).await;
        }

        let err = h
            .storefront
            .update_status(order.id_typed(), StatusUpdate::to(OrderStatus::Returned))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition(msg) if msg.contains("return")));
        let current = h.storefront.get_order(order.id_typed(), None).await.unwrap();
        assert_eq!(current.status(), OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn confirming_after_a_concurrent_cancel_is_rejected_on_retry() {
        let store = RacingStore::<Order>::arc();
        let h = Harness::with_orders(store.clone());
        let order = h.place_order(PaymentMethod::Cod).await;
        let order_id = order.id_typed();
        store.intrude(move |mut current: Order| {
            let cancel = OrderCommand::UpdateStatus(UpdateStatus::to(order_id, OrderStatus::Cancelled, Utc::now()));
            current.execute(&cancel).unwrap();
            current
        });

        let err = h
            .storefront
            .update_status(order_id, StatusUpdate::to(OrderStatus::Confirmed))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition(_)));
        assert!(store.conflicts() >= 1, "the stale write must hit the version check");
        let current = h.storefront.get_order(order_id, None).await.unwrap();
        assert_eq!(current.status(), OrderStatus::Cancelled);
        assert!(queued(&h).is_empty(), "no shipment for a cancelled order");
    }

    #[tokio::test]
    async fn racing_cancels_release_stock_once() {
        let store = RacingStore::<Order>::arc();
        let h = Harness::with_orders(store.clone());
        let order = h.place_order(PaymentMethod::Cod).await;
        let product = order.items()[0].product_id;
        assert_eq!(h.stock(product).await.stock_quantity, 8);

        let (first, second) = tokio::join!(
            h.storefront.update_status(order.id_typed(), StatusUpdate::to(OrderStatus::Cancelled)),
            h.storefront.update_status(order.id_typed(), StatusUpdate::to(OrderStatus::Cancelled)),
        );
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(WorkflowError::InvalidTransition(_)))));
        assert!(store.conflicts() >= 1);
        assert_eq!(h.stock(product).await.stock_quantity, 10);
    }

    #[tokio::test]
    async fn cancel_refunds_a_payment_that_lands_mid_update() {
        let store = RacingStore::<Order>::arc();
        let h = Harness::with_orders(store.clone());
        let order = h.place_order(PaymentMethod::Online).await;
        let order_id = order.id_typed();
        store.intrude(move |mut current: Order| {
            let paid = OrderCommand::MarkPaid(MarkPaid { order_id, method: PaymentMethod::Online, occurred_at: Utc::now() });
            current.execute(&paid).unwrap();
            current
        });

        let cancelled = h.storefront.update_status(order_id, StatusUpdate::to(OrderStatus::Cancelled)).await.unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(cancelled.payment_status(), PaymentStatus::Paid);
        assert!(store.conflicts() >= 1);
        assert_eq!(queued(&h), vec![JobKind::Refund]);
    }

    #[tokio::test]
    async fn other_customers_cannot_read_an_order() {
        let h = Harness::new();
        let order = h.place_order(PaymentMethod::Cod).await;
        let owner = order.customer_id().unwrap();

        assert!(h.storefront.get_order(order.id_typed(), Some(owner)).await.is_ok());
        assert!(h.storefront.get_order(order.id_typed(), None).await.is_ok());
        let err = h.storefront.get_order(order.id_typed(), Some(CustomerId::generate())).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden));
    }

    #[tokio::test]
    async fn admin_listing_filters_by_status() {
        let h = Harness::new();
        let first = h.place_order(PaymentMethod::Cod).await;
        h.place_order(PaymentMethod::Cod).await;
        h.advance(&first, OrderStatus::Confirmed).await;

        let confirmed = h
            .storefront
            .list_orders(OrderFilter { status: Some(OrderStatus::Confirmed), payment_status: None })
            .await
            .unwrap();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].id_typed(), first.id_typed());

        let pending_payment = h
            .storefront
            .list_orders(OrderFilter { status: None, payment_status: Some(PaymentStatus::Pending) })
            .await
            .unwrap();
        assert_eq!(pending_payment.len(), 2);
    }
}
