use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use storefront_api::app::AppServices;
use storefront_auth::{JwtClaims, PrincipalId, Role};
use storefront_catalog::{Product, ProductId};
use storefront_infra::config::AppConfig;
use storefront_infra::store::CatalogStore;

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over in-memory stores; external clients are
        // left unconfigured.
        let config = AppConfig::from_lookup(|_| None).with_jwt_secret(JWT_SECRET);
        let services = Arc::new(AppServices::in_memory(&config).expect("failed to wire services"));
        let app = storefront_api::app::router(services.clone(), JWT_SECRET);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, services, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn product(&self, price: u64, stock: u32) -> ProductId {
        let product = Product::new("TEE-BB", "Black Box Tee", price, stock);
        self.services
            .storefront()
            .catalog()
            .upsert_product(&product)
            .await
            .unwrap();
        product.id
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(sub: PrincipalId, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub,
        roles,
        issued_at: now - ChronoDuration::seconds(5),
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn admin_token() -> String {
    mint_jwt(PrincipalId::new(), vec![Role::admin()])
}

/// Token for the customer a checkout resolved to.
fn customer_token(order: &Value) -> String {
    let id: Uuid = order["customer_id"].as_str().unwrap().parse().unwrap();
    mint_jwt(PrincipalId::from_uuid(id), vec![Role::customer()])
}

fn checkout_body(product: ProductId, quantity: u32, method: &str) -> Value {
    json!({
        "items": [{ "product_id": product.to_string(), "quantity": quantity }],
        "shipping_address": {
            "first_name": "Meera",
            "last_name": "Iyer",
            "email": "meera@example.com",
            "phone": "+91 99887 76655",
            "street": "4 Lake View",
            "city": "Chennai",
            "state": "Tamil Nadu",
            "pincode": "600001"
        },
        "payment_method": method,
    })
}

async fn place_order(client: &reqwest::Client, srv: &TestServer, method: &str) -> Value {
    let product = srv.product(500, 10).await;
    let res = client
        .post(srv.url("/orders"))
        .json(&checkout_body(product, 2, method))
        .send()
        .await
        .unwrap();
    if res.status() != StatusCode::CREATED {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        panic!("expected 201 from checkout, got {status} body={body}");
    }
    let body: Value = res.json().await.unwrap();
    body["order"].clone()
}

#[tokio::test]
async fn health_is_public_and_reads_need_a_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/orders/my")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // A present but bad token is refused even on the guest checkout route.
    let product = srv.product(500, 10).await;
    let res = client
        .post(srv.url("/orders"))
        .bearer_auth("not-a-jwt")
        .json(&checkout_body(product, 1, "COD"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn guest_checkout_is_readable_only_by_its_customer() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let order = place_order(&client, &srv, "COD").await;
    assert_eq!(order["status"], "PENDING");
    assert_eq!(order["totals"]["subtotal"], 1000);
    assert!(order["order_number"].as_str().unwrap().starts_with("ORD"));
    let id = order["id"].as_str().unwrap();

    let token = customer_token(&order);
    let res = client.get(srv.url("/orders/my")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let mine: Value = res.json().await.unwrap();
    assert_eq!(mine["items"].as_array().unwrap().len(), 1);

    let res = client
        .get(srv.url(&format!("/orders/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(srv.url(&format!("/orders/{id}/tracking")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND, "no AWB assigned yet");

    let stranger = mint_jwt(PrincipalId::new(), vec![Role::customer()]);
    let res = client
        .get(srv.url(&format!("/orders/{id}")))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn shortfall_and_bad_input_are_client_errors() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = srv.product(500, 1).await;

    let res = client
        .post(srv.url("/orders"))
        .json(&checkout_body(product, 3, "COD"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
    assert!(body["message"].as_str().unwrap().contains("Insufficient stock"));

    let res = client
        .post(srv.url("/orders"))
        .json(&checkout_body(product, 1, "BARTER"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/coupons/validate"))
        .json(&json!({ "code": "NOPE", "subtotal": 1000 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["reason"], "not_found");
}

#[tokio::test]
async fn admin_drives_the_status_machine() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let order = place_order(&client, &srv, "COD").await;
    let id = order["id"].as_str().unwrap();
    let status_url = srv.url(&format!("/admin/orders/{id}/status"));

    let res = client
        .patch(&status_url)
        .bearer_auth(customer_token(&order))
        .json(&json!({ "status": "CONFIRMED" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let admin = admin_token();
    let res = client
        .patch(&status_url)
        .bearer_auth(&admin)
        .json(&json!({ "status": "confirmed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let confirmed: Value = res.json().await.unwrap();
    assert_eq!(confirmed["status"], "CONFIRMED");

    let res = client
        .patch(&status_url)
        .bearer_auth(&admin)
        .json(&json!({ "status": "DELIVERED" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = client
        .patch(&status_url)
        .bearer_auth(&admin)
        .json(&json!({ "status": "RETURNED" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY, "RETURNED comes from completed returns");

    let res = client.patch(&status_url).bearer_auth(&admin).json(&json!({})).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url("/admin/orders?status=CONFIRMED"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let listed: Value = res.json().await.unwrap();
    assert_eq!(listed["items"].as_array().unwrap().len(), 1);

    let res = client.get(srv.url("/admin/jobs/dead-letters")).bearer_auth(&admin).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let jobs: Value = res.json().await.unwrap();
    assert_eq!(jobs["stats"]["pending"], 1, "confirmation queues the shipment job");
}

#[tokio::test]
async fn online_payment_needs_a_configured_gateway() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let order = place_order(&client, &srv, "ONLINE").await;

    let res = client
        .post(srv.url("/payments/create-intent"))
        .bearer_auth(customer_token(&order))
        .json(&json!({ "order_id": order["id"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_configured");

    let res = client
        .post(srv.url("/payments/verify"))
        .json(&json!({
            "order_id": "not-an-id",
            "razorpay_order_id": "order_x",
            "razorpay_payment_id": "pay_x",
            "razorpay_signature": "sig"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_id");
}
