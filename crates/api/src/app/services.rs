//! Service wiring: stores, external clients and background workers.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing::{info, warn};

use storefront_infra::config::AppConfig;
use storefront_infra::external::{CourierError, GatewayError, HttpCourierClient, HttpPaymentGateway};
use storefront_infra::jobs::{JobExecutor, JobExecutorConfig, JobExecutorHandle};
use storefront_infra::notifications::{LoggingNotifier, NotificationWorker, WorkerHandle};
use storefront_infra::store::{
    migrate, PostgresAggregateStore, PostgresCatalog, PostgresCustomerStore, PostgresSequence, StoreError,
};
use storefront_infra::workflows::{register_job_handlers, Storefront, StorefrontParts, WorkflowError, WorkflowSettings};
use storefront_payments::Payment;
use storefront_returns::ReturnRequest;
use storefront_sales::Order;

use crate::app::errors;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("schema migration failed: {0}")]
    Migrate(#[from] StoreError),
    #[error("payment gateway client: {0}")]
    Gateway(#[from] GatewayError),
    #[error("courier client: {0}")]
    Courier(#[from] CourierError),
    #[error("background worker: {0}")]
    Worker(#[from] std::io::Error),
}

pub struct AppServices {
    storefront: Arc<Storefront>,
    development: bool,
}

impl AppServices {
    pub fn new(storefront: Arc<Storefront>, development: bool) -> Self {
        Self { storefront, development }
    }

    /// In-memory stores with HTTP clients built from `config`.
    pub fn in_memory(config: &AppConfig) -> Result<Self, BootstrapError> {
        let (gateway, courier) = clients(config)?;
        let parts = StorefrontParts::in_memory(gateway, courier).with_settings(WorkflowSettings::from(config));
        Ok(Self::new(Arc::new(Storefront::new(parts)), config.development))
    }

    pub fn storefront(&self) -> &Arc<Storefront> {
        &self.storefront
    }

    /// Render a workflow failure for this deployment.
    pub fn fail(&self, err: WorkflowError) -> axum::response::Response {
        errors::workflow_error_to_response(err, self.development)
    }

    /// Start the job executor and the notification worker.
    pub fn start_background(&self, config: &AppConfig) -> Result<Background, BootstrapError> {
        let mut executor = JobExecutor::new(self.storefront.jobs().clone());
        register_job_handlers(&mut executor, self.storefront.clone());
        let jobs = executor.spawn(JobExecutorConfig::default().with_name("storefront-jobs"));

        let notifications = NotificationWorker::spawn(
            self.storefront.bus().clone(),
            self.storefront.order_store().clone(),
            self.storefront.return_store().clone(),
            LoggingNotifier::new(config.admin_notification_email.clone()),
            tokio::runtime::Handle::current(),
        )?;

        Ok(Background { jobs, notifications })
    }
}

/// Running background workers.
pub struct Background {
    jobs: JobExecutorHandle,
    notifications: WorkerHandle,
}

impl Background {
    pub async fn shutdown(self) {
        self.jobs.shutdown().await;
        let notifications = self.notifications;
        if tokio::task::spawn_blocking(move || notifications.shutdown()).await.is_err() {
            warn!("notification worker panicked during shutdown");
        }
    }
}

type Clients = (Arc<HttpPaymentGateway>, Arc<HttpCourierClient>);

fn clients(config: &AppConfig) -> Result<Clients, BootstrapError> {
    if !config.gateway.is_configured() {
        warn!("payment gateway credentials not set; online payments are disabled");
    }
    if !config.courier.is_configured() {
        warn!("courier credentials not set; shipments will not be created");
    }
    let gateway = HttpPaymentGateway::new(config.gateway.clone(), config.external_timeout)?;
    let courier = HttpCourierClient::new(config.courier.clone(), config.external_timeout)?;
    Ok((Arc::new(gateway), Arc::new(courier)))
}

/// Postgres stores when `DATABASE_URL` is set, in-memory otherwise.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, BootstrapError> {
    let Some(database_url) = config.database_url.as_deref() else {
        info!("DATABASE_URL not set; using in-memory stores");
        return AppServices::in_memory(config);
    };

    let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
    migrate(&pool).await?;
    info!("connected to Postgres");

    let (gateway, courier) = clients(config)?;
    let catalog = Arc::new(PostgresCatalog::new(pool.clone()));
    let mut parts = StorefrontParts::in_memory(gateway, courier).with_settings(WorkflowSettings::from(config));
    parts.orders = Arc::new(PostgresAggregateStore::<Order>::new(pool.clone()));
    parts.payments = Arc::new(PostgresAggregateStore::<Payment>::new(pool.clone()));
    parts.returns = Arc::new(PostgresAggregateStore::<ReturnRequest>::new(pool.clone()));
    parts.catalog = catalog.clone();
    parts.ledger = catalog;
    parts.customers = Arc::new(PostgresCustomerStore::new(pool.clone()));
    parts.sequence = Arc::new(PostgresSequence::new(pool));

    Ok(AppServices::new(Arc::new(Storefront::new(parts)), config.development))
}
