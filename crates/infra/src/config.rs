//! Typed application configuration, read once from the environment.

use std::time::Duration;

use tracing::warn;

pub const DEFAULT_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone)]
pub struct PaymentGatewayConfig {
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
    pub base_url: String,
    pub currency: String,
}

impl PaymentGatewayConfig {
    /// Both halves of the basic-auth credential are present.
    pub fn is_configured(&self) -> bool {
        self.key_id.as_deref().is_some_and(|v| !v.is_empty())
            && self.key_secret.as_deref().is_some_and(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct CourierConfig {
    pub email: Option<String>,
    pub password: Option<String>,
    pub base_url: String,
    pub pickup_location: String,
    pub pickup_postcode: String,
}

impl CourierConfig {
    pub fn is_configured(&self) -> bool {
        self.email.as_deref().is_some_and(|v| !v.is_empty())
            && self.password.as_deref().is_some_and(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub development: bool,
    pub jwt_secret: String,
    pub database_url: Option<String>,
    pub gateway: PaymentGatewayConfig,
    pub courier: CourierConfig,
    pub external_timeout: Duration,
    pub shipment_refetch_delay: Duration,
    pub admin_notification_email: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AppConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let num = |key: &str, default: u64| get(key).and_then(|v| v.parse().ok()).unwrap_or(default);

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using insecure dev default");
            DEFAULT_JWT_SECRET.to_string()
        });

        Self {
            bind_addr: or("BIND_ADDR", "0.0.0.0:8080"),
            development: get("APP_ENV").is_some_and(|v| v.eq_ignore_ascii_case("development")),
            jwt_secret,
            database_url: get("DATABASE_URL"),
            gateway: PaymentGatewayConfig {
                key_id: get("PAYMENT_GATEWAY_KEY_ID"),
                key_secret: get("PAYMENT_GATEWAY_KEY_SECRET"),
                base_url: or("PAYMENT_GATEWAY_BASE_URL", "https://api.razorpay.com/v1"),
                currency: or("PAYMENT_CURRENCY", "INR"),
            },
            courier: CourierConfig {
                email: get("COURIER_EMAIL"),
                password: get("COURIER_PASSWORD"),
                base_url: or("COURIER_BASE_URL", "https://apiv2.shiprocket.in/v1/external"),
                pickup_location: or("COURIER_PICKUP_LOCATION", "Primary"),
                pickup_postcode: or("COURIER_PICKUP_POSTCODE", "110001"),
            },
            external_timeout: Duration::from_secs(num("EXTERNAL_TIMEOUT_SECS", 15)),
            shipment_refetch_delay: Duration::from_millis(num("SHIPMENT_REFETCH_DELAY_MS", 2500)),
            admin_notification_email: get("ADMIN_NOTIFICATION_EMAIL"),
        }
    }

    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = secret.into();
        self
    }

    pub fn with_shipment_refetch_delay(mut self, delay: Duration) -> Self {
        self.shipment_refetch_delay = delay;
        self
    }
}
