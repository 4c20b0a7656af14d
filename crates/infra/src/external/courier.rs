//! Courier aggregator client (Shiprocket-style API).
//!
//! Authentication is a login call returning a bearer token. The token is
//! cached for 24 hours and refreshed 60 seconds early; a 401 on any call
//! drops the cache and the call is retried once with a fresh token.
//! Responses are returned as raw JSON: their shapes vary and are read by
//! `storefront_fulfillment::extract`.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use storefront_fulfillment::{find_order_in_list, order_list, CreateOrderPayload};

use super::truncate_body;
use crate::config::CourierConfig;

const TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Single-order endpoints, tried in order; 404 means "try the next one".
const ORDER_PATHS: [&str; 4] = ["orders/view", "orders", "order/view", "order"];

#[derive(Debug, Error)]
pub enum CourierError {
    #[error("courier credentials are not configured")]
    NotConfigured,

    #[error("courier login failed: {0}")]
    Auth(String),

    #[error("courier resource not found: {0}")]
    NotFound(String),

    #[error("courier returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("courier request failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for CourierError {
    fn from(value: reqwest::Error) -> Self {
        CourierError::Transport(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceabilityQuery {
    pub pickup_postcode: String,
    pub delivery_postcode: String,
    pub weight_kg: f64,
    pub cod: bool,
}

#[async_trait]
pub trait CourierClient: Send + Sync {
    fn pickup_location(&self) -> &str;

    fn pickup_postcode(&self) -> &str;

    async fn create_order(&self, payload: &CreateOrderPayload) -> Result<Value, CourierError>;

    /// Assign an AWB; without a courier id the aggregator picks one.
    async fn assign_awb(&self, shipment_id: &str, courier_id: Option<&str>) -> Result<Value, CourierError>;

    async fn serviceability(&self, query: &ServiceabilityQuery) -> Result<Value, CourierError>;

    /// Look an order up by external id or order number. `Ok(None)` when no
    /// endpoint knows it (or the lookup broke down mid-way).
    async fn get_order(&self, key: &str) -> Result<Option<Value>, CourierError>;

    async fn track_awb(&self, awb: &str) -> Result<Value, CourierError>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

#[derive(Debug)]
pub struct HttpCourierClient {
    client: Client,
    config: CourierConfig,
    token: Mutex<Option<CachedToken>>,
}

impl HttpCourierClient {
    pub fn new(config: CourierConfig, timeout: Duration) -> Result<Self, CourierError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config, token: Mutex::new(None) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.token.lock().ok()?;
        guard
            .as_ref()
            .filter(|t| t.is_fresh(Instant::now()))
            .map(|t| t.token.clone())
    }

    fn invalidate_token(&self) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = None;
        }
    }

    async fn token(&self) -> Result<String, CourierError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }
        let (Some(email), Some(password)) = (self.config.email.as_deref(), self.config.password.as_deref()) else {
            return Err(CourierError::NotConfigured);
        };
        if !self.config.is_configured() {
            return Err(CourierError::NotConfigured);
        }

        let response = self
            .client
            .post(self.url("auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = truncate_body(&response.text().await.unwrap_or_default());
            error!(status = %status, body = %body, "courier login failed");
            return Err(CourierError::Auth(format!("{status}: {body}")));
        }

        let doc: Value = response.json().await?;
        let token = doc
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CourierError::Auth("login response carried no token".to_string()))?
            .to_string();

        if let Ok(mut guard) = self.token.lock() {
            *guard = Some(CachedToken { token: token.clone(), expires_at: Instant::now() + TOKEN_TTL });
        }
        debug!("courier token refreshed");
        Ok(token)
    }

    /// Send an authenticated request, retrying once after a 401.
    async fn call<F>(&self, label: &str, build: F) -> Result<Value, CourierError>
    where
        F: Fn(&str) -> RequestBuilder + Send + Sync,
    {
        let mut retried = false;
        loop {
            let token = self.token().await?;
            let response = build(&token).send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !retried {
                warn!(call = label, "courier token rejected, logging in again");
                self.invalidate_token();
                retried = true;
                continue;
            }

            if status.is_success() {
                let text = response.text().await?;
                if text.trim().is_empty() {
                    return Ok(Value::Null);
                }
                return serde_json::from_str(&text).map_err(|e| CourierError::Transport(e.to_string()));
            }

            let body = truncate_body(&response.text().await.unwrap_or_default());
            if status == StatusCode::NOT_FOUND {
                debug!(call = label, body = %body, "courier resource not found");
                return Err(CourierError::NotFound(body));
            }
            error!(call = label, status = %status, body = %body, "courier call failed");
            return Err(CourierError::Upstream { status: status.as_u16(), body });
        }
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client.request(method, self.url(path)).bearer_auth(token)
    }

    async fn find_in_listing(&self, key: &str) -> Result<Option<Value>, CourierError> {
        let listings: [Vec<(&str, String)>; 2] = [
            vec![("page", "1".to_string()), ("per_page", "100".to_string())],
            vec![("order_id", key.to_string())],
        ];
        for params in &listings {
            let doc = match self
                .call("list_orders", |token| self.request(Method::GET, "orders", token).query(params))
                .await
            {
                Ok(doc) => doc,
                Err(e @ (CourierError::NotConfigured | CourierError::Auth(_))) => return Err(e),
                Err(e) => {
                    warn!(key, error = %e, "courier order listing failed");
                    continue;
                }
            };
            if let Some(found) = find_order_in_list(&order_list(&doc), key) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl CourierClient for HttpCourierClient {
    fn pickup_location(&self) -> &str {
        &self.config.pickup_location
    }

    fn pickup_postcode(&self) -> &str {
        &self.config.pickup_postcode
    }

    #[instrument(skip(self, payload), fields(order_number = %payload.order_id), err)]
    async fn create_order(&self, payload: &CreateOrderPayload) -> Result<Value, CourierError> {
        self.call("create_order", |token| {
            self.request(Method::POST, "orders/create/adhoc", token).json(payload)
        })
        .await
    }

    #[instrument(skip(self), err)]
    async fn assign_awb(&self, shipment_id: &str, courier_id: Option<&str>) -> Result<Value, CourierError> {
        let mut body = json!({ "shipment_id": shipment_id });
        if let Some(courier_id) = courier_id {
            body["courier_id"] = Value::String(courier_id.to_string());
        }
        self.call("assign_awb", |token| {
            self.request(Method::POST, "courier/assign/awb", token).json(&body)
        })
        .await
    }

    #[instrument(skip(self), fields(delivery_postcode = %query.delivery_postcode), err)]
    async fn serviceability(&self, query: &ServiceabilityQuery) -> Result<Value, CourierError> {
        let params = [
            ("pickup_postcode", query.pickup_postcode.clone()),
            ("delivery_postcode", query.delivery_postcode.clone()),
            ("weight", query.weight_kg.to_string()),
            ("cod", if query.cod { "1" } else { "0" }.to_string()),
        ];
        self.call("serviceability", |token| {
            self.request(Method::GET, "courier/serviceability/", token).query(&params)
        })
        .await
    }

    #[instrument(skip(self), err)]
    async fn get_order(&self, key: &str) -> Result<Option<Value>, CourierError> {
        let key = key.trim();
        if key.is_empty() {
            return Ok(None);
        }
        for base in ORDER_PATHS {
            let path = format!("{base}/{key}");
            match self.call("get_order", |token| self.request(Method::GET, &path, token)).await {
                Ok(Value::Null) => continue,
                Ok(doc) => return Ok(Some(doc)),
                Err(CourierError::NotFound(_)) => continue,
                Err(e @ (CourierError::NotConfigured | CourierError::Auth(_))) => return Err(e),
                Err(e) => {
                    warn!(key, path = %path, error = %e, "courier order lookup failed");
                    return Ok(None);
                }
            }
        }
        self.find_in_listing(key).await
    }

    #[instrument(skip(self), err)]
    async fn track_awb(&self, awb: &str) -> Result<Value, CourierError> {
        let path = format!("courier/track/awb/{}", awb.trim());
        self.call("track_awb", |token| self.request(Method::GET, &path, token)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};

    #[derive(Clone, Default)]
    struct Counters {
        logins: Arc<AtomicUsize>,
        creates: Arc<AtomicUsize>,
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn config(base_url: String) -> CourierConfig {
        CourierConfig {
            email: Some("ops@example.com".into()),
            password: Some("pw".into()),
            base_url,
            pickup_location: "Primary".into(),
            pickup_postcode: "110001".into(),
        }
    }

    fn bearer(headers: &HeaderMap) -> String {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .trim_start_matches("Bearer ")
            .to_string()
    }

    fn fake_aggregator(counters: Counters) -> Router {
        Router::new()
            .route(
                "/auth/login",
                post(|State(c): State<Counters>| async move {
                    let n = c.logins.fetch_add(1, Ordering::SeqCst) + 1;
                    Json(json!({ "token": format!("tok{n}") }))
                }),
            )
            .route(
                "/orders/create/adhoc",
                post(|State(c): State<Counters>, headers: HeaderMap| async move {
                    c.creates.fetch_add(1, Ordering::SeqCst);
                    // First token is treated as expired.
                    if bearer(&headers) == "tok1" {
                        return (AxumStatus::UNAUTHORIZED, "expired").into_response();
                    }
                    Json(json!({ "order_id": 77, "shipment_id": 88 })).into_response()
                }),
            )
            .route(
                "/orders/view/:id",
                get(|Path(id): Path<String>| async move {
                    if id == "77" {
                        Json(json!({ "data": { "id": 77, "awb_code": "AWB77" } })).into_response()
                    } else {
                        (AxumStatus::NOT_FOUND, "nope").into_response()
                    }
                }),
            )
            .route("/orders/:id", get(|| async { (AxumStatus::NOT_FOUND, "nope") }))
            .route("/order/view/:id", get(|| async { (AxumStatus::NOT_FOUND, "nope") }))
            .route("/order/:id", get(|| async { (AxumStatus::NOT_FOUND, "nope") }))
            .route(
                "/orders",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    if q.get("order_id").map(String::as_str) == Some("ORD123") {
                        Json(json!({ "data": [
                            { "id": 5, "order": { "order_id": "ORD123", "awb_code": "AWB5" } }
                        ] }))
                    } else {
                        Json(json!({ "data": { "orders": [] } }))
                    }
                }),
            )
            .route(
                "/courier/track/awb/:awb",
                get(|Path(awb): Path<String>| async move {
                    if awb == "AWB77" {
                        Json(json!({ "tracking_data": { "shipment_status": 6 } })).into_response()
                    } else {
                        (AxumStatus::NOT_FOUND, "unknown awb").into_response()
                    }
                }),
            )
            .with_state(counters)
    }

    fn sample_payload() -> CreateOrderPayload {
        CreateOrderPayload {
            order_id: "ORD1".into(),
            order_date: "2025-03-01".into(),
            channel_id: String::new(),
            pickup_location: "Primary".into(),
            billing_customer_name: "Asha".into(),
            billing_last_name: "Rao".into(),
            billing_address: "1 Main St".into(),
            billing_address_2: String::new(),
            billing_city: "Pune".into(),
            billing_pincode: "411001".into(),
            billing_state: "MH".into(),
            billing_country: "India".into(),
            billing_email: "asha@example.com".into(),
            billing_phone: "9876543210".into(),
            shipping_customer_name: "Asha".into(),
            shipping_last_name: "Rao".into(),
            shipping_address: "1 Main St".into(),
            shipping_address_2: String::new(),
            shipping_city: "Pune".into(),
            shipping_pincode: "411001".into(),
            shipping_state: "MH".into(),
            shipping_country: "India".into(),
            shipping_email: "asha@example.com".into(),
            shipping_phone: "9876543210".into(),
            shipping_is_billing: "1".into(),
            order_items: Vec::new(),
            payment_method: "Prepaid".into(),
            sub_total: 1300,
            dimensions: storefront_fulfillment::PARCEL_DIMENSIONS,
            weight: 0.5,
        }
    }

    #[tokio::test]
    async fn unauthorized_call_logs_in_again_and_retries_once() {
        let counters = Counters::default();
        let base = spawn(fake_aggregator(counters.clone())).await;
        let client = HttpCourierClient::new(config(base), Duration::from_secs(5)).unwrap();

        let doc = client.create_order(&sample_payload()).await.unwrap();
        assert_eq!(doc["order_id"], 77);
        assert_eq!(counters.logins.load(Ordering::SeqCst), 2);
        assert_eq!(counters.creates.load(Ordering::SeqCst), 2);

        // The refreshed token is cached.
        client.create_order(&sample_payload()).await.unwrap();
        assert_eq!(counters.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn get_order_tries_view_path_first() {
        let base = spawn(fake_aggregator(Counters::default())).await;
        let client = HttpCourierClient::new(config(base), Duration::from_secs(5)).unwrap();

        let doc = client.get_order("77").await.unwrap().unwrap();
        assert_eq!(storefront_fulfillment::tracking_number(&doc).as_deref(), Some("AWB77"));
    }

    #[tokio::test]
    async fn get_order_falls_back_to_listing_and_flattens() {
        let base = spawn(fake_aggregator(Counters::default())).await;
        let client = HttpCourierClient::new(config(base), Duration::from_secs(5)).unwrap();

        let doc = client.get_order("ORD123").await.unwrap().unwrap();
        assert_eq!(doc["id"], 5);
        assert_eq!(storefront_fulfillment::tracking_number(&doc).as_deref(), Some("AWB5"));

        assert!(client.get_order("ORD999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn track_propagates_not_found() {
        let base = spawn(fake_aggregator(Counters::default())).await;
        let client = HttpCourierClient::new(config(base), Duration::from_secs(5)).unwrap();

        assert!(client.track_awb("AWB77").await.is_ok());
        assert!(matches!(client.track_awb("AWB00").await, Err(CourierError::NotFound(_))));
    }

    #[tokio::test]
    async fn missing_credentials_are_reported() {
        let mut cfg = config("http://127.0.0.1:9".into());
        cfg.password = None;
        let client = HttpCourierClient::new(cfg, Duration::from_secs(1)).unwrap();
        assert!(matches!(client.track_awb("X").await, Err(CourierError::NotConfigured)));
    }

    #[test]
    fn token_refreshes_a_minute_early() {
        let now = Instant::now();
        let token = CachedToken { token: "t".into(), expires_at: now + Duration::from_secs(30) };
        assert!(!token.is_fresh(now));
        let token = CachedToken { token: "t".into(), expires_at: now + TOKEN_TTL };
        assert!(token.is_fresh(now));
    }
}
