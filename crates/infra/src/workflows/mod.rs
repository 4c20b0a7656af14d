//! Application workflows: checkout, payment, fulfillment and returns.
//!
//! A [`Storefront`] owns the stores, the inventory ledger, the external
//! clients and the job queue, and coordinates them. Domain rules stay in the
//! aggregates; this layer sequences IO around them.

mod checkout;
mod fulfillment;
mod jobs;
mod orders;
mod payments;
mod returns;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use thiserror::Error;

use storefront_core::DomainError;
use storefront_events::{EventEnvelope, InMemoryEventBus};
use storefront_payments::Payment;
use storefront_returns::{ReturnId, ReturnRequest};
use storefront_sales::{Order, OrderId};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::AppConfig;
use crate::external::{CourierClient, CourierError, GatewayError, PaymentGateway};
use crate::jobs::JobStore;
use crate::ledger::InventoryLedger;
use crate::store::{AggregateStore, CatalogStore, CustomerStore, SequenceGenerator, StoreError};

pub use checkout::{CheckoutItem, CheckoutReceipt, CheckoutRequest, CouponCheck};
pub use fulfillment::ShipmentOutcome;
pub use jobs::register_job_handlers;
pub use orders::{OrderFilter, StatusUpdate};
pub use payments::{PaymentIntent, PaymentVerification, RefundOutcome};
pub use returns::{CreateReturn, RefundUpdate, ReturnFilter};

pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

pub type OrderStore = Arc<dyn AggregateStore<Order>>;
pub type PaymentStore = Arc<dyn AggregateStore<Payment>>;
pub type ReturnStore = Arc<dyn AggregateStore<ReturnRequest>>;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("forbidden")]
    Forbidden,

    /// Illegal state-machine move.
    #[error("{0}")]
    InvalidTransition(String),

    /// Stale version after retries.
    #[error("{0}")]
    Conflict(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("{service} failed: {body}")]
    Upstream {
        service: &'static str,
        status: Option<u16>,
        body: String,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        WorkflowError::Validation(msg.into())
    }

    pub fn not_found(what: &str) -> Self {
        WorkflowError::NotFound(format!("{what} not found"))
    }

    /// Worth running again later (external hiccups, lost races).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::Upstream { .. } | WorkflowError::Conflict(_) | WorkflowError::Internal(_)
        )
    }
}

impl From<DomainError> for WorkflowError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => WorkflowError::Validation(msg),
            DomainError::InvariantViolation(msg) => WorkflowError::InvalidTransition(msg),
            DomainError::Conflict(msg) => WorkflowError::Conflict(msg),
            DomainError::NotFound => WorkflowError::NotFound("Resource not found".to_string()),
            DomainError::Unauthorized => WorkflowError::Forbidden,
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => WorkflowError::Conflict(msg),
            StoreError::AlreadyExists(what) => WorkflowError::AlreadyExists(what),
            other => WorkflowError::Internal(other.to_string()),
        }
    }
}

impl From<DispatchError> for WorkflowError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Validation(msg) => WorkflowError::Validation(msg),
            DispatchError::InvariantViolation(msg) => WorkflowError::InvalidTransition(msg),
            DispatchError::Concurrency(msg) => WorkflowError::Conflict(msg),
            DispatchError::Unauthorized => WorkflowError::Forbidden,
            DispatchError::NotFound => WorkflowError::NotFound("Resource not found".to_string()),
            DispatchError::AlreadyExists(what) => WorkflowError::AlreadyExists(what),
            DispatchError::Serialize(msg) => WorkflowError::Internal(msg),
            DispatchError::Store(e) => e.into(),
        }
    }
}

impl From<GatewayError> for WorkflowError {
    fn from(value: GatewayError) -> Self {
        const SERVICE: &str = "payment gateway";
        match value {
            GatewayError::NotConfigured => WorkflowError::NotConfigured(SERVICE),
            GatewayError::Upstream { status, body } => WorkflowError::Upstream { service: SERVICE, status: Some(status), body },
            GatewayError::Transport(body) => WorkflowError::Upstream { service: SERVICE, status: None, body },
        }
    }
}

impl From<CourierError> for WorkflowError {
    fn from(value: CourierError) -> Self {
        const SERVICE: &str = "courier";
        match value {
            CourierError::NotConfigured => WorkflowError::NotConfigured(SERVICE),
            CourierError::NotFound(what) => WorkflowError::NotFound(format!("Courier has no record of {what}")),
            CourierError::Auth(body) => WorkflowError::Upstream { service: SERVICE, status: Some(401), body },
            CourierError::Upstream { status, body } => WorkflowError::Upstream { service: SERVICE, status: Some(status), body },
            CourierError::Transport(body) => WorkflowError::Upstream { service: SERVICE, status: None, body },
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Timing knobs for the background side of the workflows.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowSettings {
    /// Wait before assigning an AWB to a freshly created external order, and
    /// before the deferred re-fetch.
    pub shipment_refetch_delay: Duration,
    /// Upper bound for one reconcile-on-view lookup.
    pub external_timeout: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            shipment_refetch_delay: Duration::from_millis(2500),
            external_timeout: Duration::from_secs(15),
        }
    }
}

impl From<&AppConfig> for WorkflowSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            shipment_refetch_delay: config.shipment_refetch_delay,
            external_timeout: config.external_timeout,
        }
    }
}

/// Everything a [`Storefront`] is assembled from.
pub struct StorefrontParts {
    pub orders: OrderStore,
    pub payments: PaymentStore,
    pub returns: ReturnStore,
    pub catalog: Arc<dyn CatalogStore>,
    pub ledger: Arc<dyn InventoryLedger>,
    pub customers: Arc<dyn CustomerStore>,
    pub sequence: Arc<dyn SequenceGenerator>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub courier: Arc<dyn CourierClient>,
    pub jobs: Arc<dyn JobStore>,
    pub bus: SharedBus,
    pub settings: WorkflowSettings,
}

impl StorefrontParts {
    /// In-memory stores around the given external clients.
    pub fn in_memory(gateway: Arc<dyn PaymentGateway>, courier: Arc<dyn CourierClient>) -> Self {
        use crate::jobs::InMemoryJobStore;
        use crate::store::{InMemoryAggregateStore, InMemoryCatalog, InMemoryCustomerStore, InMemorySequence};

        let catalog = InMemoryCatalog::arc();
        Self {
            orders: Arc::new(InMemoryAggregateStore::<Order>::new()),
            payments: Arc::new(InMemoryAggregateStore::<Payment>::new()),
            returns: Arc::new(InMemoryAggregateStore::<ReturnRequest>::new()),
            catalog: catalog.clone(),
            ledger: catalog,
            customers: InMemoryCustomerStore::arc(),
            sequence: Arc::new(InMemorySequence::new()),
            gateway,
            courier,
            jobs: InMemoryJobStore::arc(),
            bus: Arc::new(InMemoryEventBus::new()),
            settings: WorkflowSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: WorkflowSettings) -> Self {
        self.settings = settings;
        self
    }
}

pub struct Storefront {
    orders: CommandDispatcher<OrderStore, SharedBus>,
    payments: CommandDispatcher<PaymentStore, SharedBus>,
    returns: CommandDispatcher<ReturnStore, SharedBus>,
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<dyn InventoryLedger>,
    customers: Arc<dyn CustomerStore>,
    sequence: Arc<dyn SequenceGenerator>,
    gateway: Arc<dyn PaymentGateway>,
    courier: Arc<dyn CourierClient>,
    jobs: Arc<dyn JobStore>,
    bus: SharedBus,
    settings: WorkflowSettings,
}

impl Storefront {
    pub fn new(parts: StorefrontParts) -> Self {
        Self {
            orders: CommandDispatcher::new(parts.orders, parts.bus.clone()),
            payments: CommandDispatcher::new(parts.payments, parts.bus.clone()),
            returns: CommandDispatcher::new(parts.returns, parts.bus.clone()),
            catalog: parts.catalog,
            ledger: parts.ledger,
            customers: parts.customers,
            sequence: parts.sequence,
            gateway: parts.gateway,
            courier: parts.courier,
            jobs: parts.jobs,
            bus: parts.bus,
            settings: parts.settings,
        }
    }

    pub fn bus(&self) -> &SharedBus {
        &self.bus
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.catalog
    }

    pub fn customers(&self) -> &Arc<dyn CustomerStore> {
        &self.customers
    }

    pub fn order_store(&self) -> &OrderStore {
        self.orders.store()
    }

    pub fn return_store(&self) -> &ReturnStore {
        self.returns.store()
    }

    pub fn payment_store(&self) -> &PaymentStore {
        self.payments.store()
    }

    pub fn gateway(&self) -> &Arc<dyn PaymentGateway> {
        &self.gateway
    }

    pub fn settings(&self) -> WorkflowSettings {
        self.settings
    }

    pub(crate) async fn load_order(&self, order_id: OrderId) -> WorkflowResult<Order> {
        self.orders
            .store()
            .load(order_id.aggregate_id())
            .await?
            .ok_or_else(|| WorkflowError::not_found("Order"))
    }

    pub(crate) async fn load_return(&self, return_id: ReturnId) -> WorkflowResult<ReturnRequest> {
        self.returns
            .store()
            .load(return_id.aggregate_id())
            .await?
            .ok_or_else(|| WorkflowError::not_found("Return request"))
    }

    /// The payment record for an order, preferring one on `gateway`.
    pub(crate) async fn payment_for_order(
        &self,
        order_id: OrderId,
        gateway: Option<storefront_payments::Gateway>,
    ) -> WorkflowResult<Option<Payment>> {
        let mut candidates = self.payments.store().find_by_key(&order_id.to_string()).await?;
        let preferred = gateway.and_then(|g| candidates.iter().position(|p| p.gateway() == g));
        Ok(match preferred {
            Some(idx) => Some(candidates.swap_remove(idx)),
            None => candidates.into_iter().next(),
        })
    }
}

#[cfg(test)]
pub(crate) mod fakes;
