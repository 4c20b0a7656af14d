use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument};

use storefront_core::money::to_minor_units;
use storefront_core::Amount;
use storefront_payments::verify_signature;

use super::truncate_body;
use crate::config::PaymentGatewayConfig;

/// Header the gateway dedupes refund requests on.
pub const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway credentials are not configured")]
    NotConfigured,

    #[error("payment gateway returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("payment gateway request failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(value: reqwest::Error) -> Self {
        GatewayError::Transport(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayNotes {
    pub order_id: String,
    pub order_number: String,
}

/// Body of the gateway's create-order call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateGatewayOrder {
    /// Minor units (paise).
    pub amount: u64,
    pub currency: String,
    pub receipt: String,
    pub payment_capture: u8,
    pub notes: GatewayNotes,
}

impl CreateGatewayOrder {
    pub fn for_order(total: Amount, currency: &str, order_id: impl ToString, order_number: &str) -> Self {
        Self {
            amount: to_minor_units(total),
            currency: currency.to_string(),
            receipt: order_number.to_string(),
            payment_capture: 1,
            notes: GatewayNotes {
                order_id: order_id.to_string(),
                order_number: order_number.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRefund {
    pub id: String,
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub status: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key handed to the browser checkout.
    fn key_id(&self) -> Option<&str>;

    fn currency(&self) -> &str;

    /// Refunds and intents need credentials; callers skip or fail early without them.
    fn is_configured(&self) -> bool;

    /// Check a checkout callback signature against the key secret.
    fn verify(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> Result<bool, GatewayError>;

    async fn create_order(&self, request: &CreateGatewayOrder) -> Result<GatewayOrder, GatewayError>;

    /// Refund `amount` minor units of a captured payment. Repeating a call
    /// with the same `idempotency_key` must not refund twice.
    async fn refund(&self, gateway_payment_id: &str, amount: u64, idempotency_key: &str)
        -> Result<GatewayRefund, GatewayError>;
}

/// Basic-auth JSON client for a Razorpay-style gateway.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    config: PaymentGatewayConfig,
}

impl HttpPaymentGateway {
    pub fn new(config: PaymentGatewayConfig, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    fn credentials(&self) -> Result<(&str, &str), GatewayError> {
        match (self.config.key_id.as_deref(), self.config.key_secret.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Ok((id, secret)),
            _ => Err(GatewayError::NotConfigured),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post<B, R>(&self, path: &str, body: &B, idempotency_key: Option<&str>) -> Result<R, GatewayError>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let (key_id, key_secret) = self.credentials()?;
        let mut request = self.client.post(self.url(path)).basic_auth(key_id, Some(key_secret)).json(body);
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key);
        }
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            debug!(path, status = %status, "payment gateway call succeeded");
            Ok(response.json::<R>().await?)
        } else {
            let body = truncate_body(&response.text().await.unwrap_or_default());
            error!(path, status = %status, body = %body, "payment gateway call failed");
            Err(GatewayError::Upstream { status: status.as_u16(), body })
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    fn key_id(&self) -> Option<&str> {
        self.config.key_id.as_deref()
    }

    fn currency(&self) -> &str {
        &self.config.currency
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn verify(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> Result<bool, GatewayError> {
        let (_, secret) = self.credentials()?;
        Ok(verify_signature(secret, gateway_order_id, gateway_payment_id, signature))
    }

    #[instrument(skip(self, request), fields(receipt = %request.receipt, amount = request.amount), err)]
    async fn create_order(&self, request: &CreateGatewayOrder) -> Result<GatewayOrder, GatewayError> {
        self.post("orders", request, None).await
    }

    #[instrument(skip(self), err)]
    async fn refund(
        &self,
        gateway_payment_id: &str,
        amount: u64,
        idempotency_key: &str,
    ) -> Result<GatewayRefund, GatewayError> {
        self.post(
            &format!("payments/{gateway_payment_id}/refund"),
            &serde_json::json!({ "amount": amount, "receipt": idempotency_key }),
            Some(idempotency_key),
        )
        .await
    }
}
