//! Customer and admin notifications.
//!
//! Delivery itself (email) is outside this system: [`LoggingNotifier`]
//! records each notification through `tracing`. The [`NotificationWorker`]
//! decides what to send from bus events.

pub mod worker;

use thiserror::Error;
use tracing::info;

use storefront_returns::ReturnRequest;
use storefront_sales::{Order, OrderStatus};

pub use worker::{route, Notice, NotificationWorker, WorkerHandle};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification has no recipient: {0}")]
    NoRecipient(String),

    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

pub trait Notifier: Send + Sync {
    fn new_order_admin(&self, order: &Order) -> Result<(), NotifyError>;

    fn order_confirmation_customer(&self, order: &Order) -> Result<(), NotifyError>;

    fn order_status_changed(&self, order: &Order, from: OrderStatus, to: OrderStatus) -> Result<(), NotifyError>;

    fn return_status_changed(&self, request: &ReturnRequest) -> Result<(), NotifyError>;
}

fn customer_email(order: &Order) -> Result<&str, NotifyError> {
    order
        .shipping_address()
        .map(|a| a.email.as_str())
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| NotifyError::NoRecipient(order.order_number().to_string()))
}

#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier {
    admin_email: Option<String>,
}

impl LoggingNotifier {
    pub fn new(admin_email: Option<String>) -> Self {
        Self { admin_email }
    }
}

impl Notifier for LoggingNotifier {
    fn new_order_admin(&self, order: &Order) -> Result<(), NotifyError> {
        let to = self
            .admin_email
            .as_deref()
            .ok_or_else(|| NotifyError::NoRecipient("admin".to_string()))?;
        info!(
            to,
            order_number = order.order_number(),
            total = order.total(),
            items = order.items().len(),
            "notify: new order"
        );
        Ok(())
    }

    fn order_confirmation_customer(&self, order: &Order) -> Result<(), NotifyError> {
        let to = customer_email(order)?;
        info!(to, order_number = order.order_number(), total = order.total(), "notify: order confirmation");
        Ok(())
    }

    fn order_status_changed(&self, order: &Order, from: OrderStatus, to_status: OrderStatus) -> Result<(), NotifyError> {
        let to = customer_email(order)?;
        info!(
            to,
            order_number = order.order_number(),
            from = %from,
            status = %to_status,
            awb = order.shipment().tracking_number.as_deref(),
            "notify: order status changed"
        );
        Ok(())
    }

    fn return_status_changed(&self, request: &ReturnRequest) -> Result<(), NotifyError> {
        info!(
            return_number = request.return_number(),
            status = ?request.status(),
            refund_amount = request.refund_amount(),
            "notify: return status changed"
        );
        Ok(())
    }
}
