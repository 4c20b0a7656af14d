//! Scriptable gateway and courier doubles for workflow tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use storefront_catalog::{Product, ProductId};
use storefront_core::{AggregateId, AggregateRoot, ExpectedVersion};
use storefront_customers::CustomerId;
use storefront_sales::{AddressInput, Order, OrderStatus, PaymentMethod};
use storefront_fulfillment::CreateOrderPayload;
use storefront_payments::{sign, verify_signature};

use crate::external::{
    CourierClient, CourierError, CreateGatewayOrder, GatewayError, GatewayOrder, GatewayRefund, PaymentGateway,
    ServiceabilityQuery,
};
use crate::store::{AggregateStore, InMemoryAggregateStore, Snapshot, StoreError};

use super::{CheckoutItem, CheckoutRequest, OrderStore, StatusUpdate, Storefront, StorefrontParts, WorkflowSettings};

pub(crate) const SECRET: &str = "test_secret";

pub(crate) fn signature(gateway_order_id: &str, gateway_payment_id: &str) -> String {
    sign(SECRET, gateway_order_id, gateway_payment_id).unwrap()
}

#[derive(Debug, Default)]
pub(crate) struct FakeGateway {
    pub unconfigured: AtomicBool,
    pub fail_refunds: AtomicBool,
    pub orders: Mutex<Vec<CreateGatewayOrder>>,
    pub refunds: Mutex<Vec<(String, u64)>>,
    pub refund_keys: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn key_id(&self) -> Option<&str> {
        Some("rzp_test_key")
    }

    fn currency(&self) -> &str {
        "INR"
    }

    fn is_configured(&self) -> bool {
        !self.unconfigured.load(Ordering::SeqCst)
    }

    fn verify(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> Result<bool, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }
        Ok(verify_signature(SECRET, gateway_order_id, gateway_payment_id, signature))
    }

    async fn create_order(&self, request: &CreateGatewayOrder) -> Result<GatewayOrder, GatewayError> {
        let mut orders = self.orders.lock().unwrap();
        orders.push(request.clone());
        Ok(GatewayOrder {
            id: format!("order_gw_{}", orders.len()),
            amount: request.amount,
            currency: request.currency.clone(),
        })
    }

    async fn refund(
        &self,
        gateway_payment_id: &str,
        amount: u64,
        idempotency_key: &str,
    ) -> Result<GatewayRefund, GatewayError> {
        // Suspend like a network call so concurrent callers interleave.
        tokio::task::yield_now().await;
        self.refund_keys.lock().unwrap().push(idempotency_key.to_string());
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(GatewayError::Upstream { status: 502, body: "bad gateway".into() });
        }
        let mut refunds = self.refunds.lock().unwrap();
        refunds.push((gateway_payment_id.to_string(), amount));
        Ok(GatewayRefund { id: format!("rfnd_{}", refunds.len()), amount, status: Some("processed".into()) })
    }
}

/// Courier double. Each endpoint answers with a scripted document.
#[derive(Debug)]
pub(crate) struct FakeCourier {
    pub create_response: Mutex<Value>,
    pub auto_assign: Mutex<Value>,
    pub courier_assign: Mutex<Value>,
    pub serviceable: Mutex<Value>,
    pub known_orders: Mutex<HashMap<String, Value>>,
    pub fail_create: AtomicBool,
    pub creates: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
}

impl Default for FakeCourier {
    fn default() -> Self {
        Self {
            create_response: Mutex::new(json!({"order_id": 9001, "shipment_id": 7001, "status": "NEW"})),
            auto_assign: Mutex::new(json!({"awb_assign_status": 0})),
            courier_assign: Mutex::new(json!({"awb_assign_status": 0})),
            serviceable: Mutex::new(json!({"data": {"available_courier_companies": []}})),
            known_orders: Mutex::new(HashMap::new()),
            fail_create: AtomicBool::new(false),
            creates: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeCourier {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(slot: &Mutex<Value>, value: Value) {
        *slot.lock().unwrap() = value;
    }

    pub fn know_order(&self, key: &str, doc: Value) {
        self.known_orders.lock().unwrap().insert(key.to_string(), doc);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CourierClient for FakeCourier {
    fn pickup_location(&self) -> &str {
        "Primary"
    }

    fn pickup_postcode(&self) -> &str {
        "110001"
    }

    async fn create_order(&self, payload: &CreateOrderPayload) -> Result<Value, CourierError> {
        self.log(format!("create:{}", payload.order_id));
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(CourierError::Upstream { status: 500, body: "aggregator down".into() });
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(self.create_response.lock().unwrap().clone())
    }

    async fn assign_awb(&self, shipment_id: &str, courier_id: Option<&str>) -> Result<Value, CourierError> {
        self.log(format!("assign:{shipment_id}:{}", courier_id.unwrap_or("auto")));
        let slot = if courier_id.is_some() { &self.courier_assign } else { &self.auto_assign };
        Ok(slot.lock().unwrap().clone())
    }

    async fn serviceability(&self, query: &ServiceabilityQuery) -> Result<Value, CourierError> {
        self.log(format!("serviceability:{}:{}", query.delivery_postcode, query.weight_kg));
        Ok(self.serviceable.lock().unwrap().clone())
    }

    async fn get_order(&self, key: &str) -> Result<Option<Value>, CourierError> {
        self.log(format!("get:{key}"));
        Ok(self.known_orders.lock().unwrap().get(key).cloned())
    }

    async fn track_awb(&self, awb: &str) -> Result<Value, CourierError> {
        self.log(format!("track:{awb}"));
        if awb == "UNKNOWN" {
            return Err(CourierError::NotFound(format!("awb {awb}")));
        }
        Ok(json!({"tracking_data": {"awb": awb, "shipment_status": 6}}))
    }
}

type Intrusion<A> = Box<dyn FnOnce(A) -> A + Send>;

/// Snapshot store that suspends after every load, so concurrent dispatches
/// read the same version. `intrude` lands one competing write between the
/// next load and the save that follows it.
pub(crate) struct RacingStore<A: Snapshot> {
    inner: InMemoryAggregateStore<A>,
    intrusion: Mutex<Option<Intrusion<A>>>,
    conflicts: AtomicUsize,
    pub refuse_saves: AtomicBool,
}

impl<A: Snapshot> RacingStore<A> {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryAggregateStore::new(),
            intrusion: Mutex::new(None),
            conflicts: AtomicUsize::new(0),
            refuse_saves: AtomicBool::new(false),
        })
    }

    pub fn intrude(&self, write: impl FnOnce(A) -> A + Send + 'static) {
        *self.intrusion.lock().unwrap() = Some(Box::new(write));
    }

    pub fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<A: Snapshot> AggregateStore<A> for RacingStore<A> {
    async fn load(&self, id: AggregateId) -> Result<Option<A>, StoreError> {
        let loaded = self.inner.load(id).await?;
        let intrusion = self.intrusion.lock().unwrap().take();
        if let (Some(write), Some(current)) = (intrusion, loaded.clone()) {
            let version = current.version();
            self.inner.save(&write(current), ExpectedVersion::Exact(version)).await?;
        }
        tokio::task::yield_now().await;
        Ok(loaded)
    }

    async fn save(&self, aggregate: &A, expected: ExpectedVersion) -> Result<(), StoreError> {
        if self.refuse_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!("{} store unavailable", A::AGGREGATE_TYPE)));
        }
        let saved = self.inner.save(aggregate, expected).await;
        if matches!(saved, Err(StoreError::Concurrency(_))) {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        saved
    }

    async fn find_by_key(&self, key: &str) -> Result<Vec<A>, StoreError> {
        self.inner.find_by_key(key).await
    }

    async fn list_by_owner(&self, owner: CustomerId) -> Result<Vec<A>, StoreError> {
        self.inner.list_by_owner(owner).await
    }

    async fn list_all(&self) -> Result<Vec<A>, StoreError> {
        self.inner.list_all().await
    }
}

/// An in-memory storefront wired to the fakes above.
pub(crate) struct Harness {
    pub storefront: Storefront,
    pub gateway: Arc<FakeGateway>,
    pub courier: Arc<FakeCourier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Same wiring with `orders` as the order store.
    pub fn with_orders(orders: OrderStore) -> Self {
        Self::build(Some(orders))
    }

    fn build(orders: Option<OrderStore>) -> Self {
        let gateway = FakeGateway::arc();
        let courier = FakeCourier::arc();
        let settings = WorkflowSettings {
            shipment_refetch_delay: Duration::ZERO,
            external_timeout: Duration::from_secs(1),
        };
        let mut parts = StorefrontParts::in_memory(gateway.clone(), courier.clone()).with_settings(settings);
        if let Some(orders) = orders {
            parts.orders = orders;
        }
        Self { storefront: Storefront::new(parts), gateway, courier }
    }

    pub async fn product(&self, product: Product) -> ProductId {
        self.storefront.catalog().upsert_product(&product).await.unwrap();
        product.id
    }

    pub async fn stock(&self, id: ProductId) -> Product {
        self.storefront.catalog().product(id).await.unwrap().unwrap()
    }

    /// Two units of a fresh 500-priced product, shipped to Bengaluru.
    pub async fn place_order(&self, method: PaymentMethod) -> Order {
        let product = self.product(Product::new("TEE-A", "Tee A", 500, 10)).await;
        let request = CheckoutRequest {
            customer_id: None,
            items: vec![CheckoutItem { product_id: product, quantity: 2, size: None, color: None, price: None }],
            shipping_address: AddressInput {
                first_name: "Asha".into(),
                last_name: "Rao".into(),
                email: "asha@example.com".into(),
                phone: "+91 98765 43210".into(),
                street: Some("12 MG Road".into()),
                city: "Bengaluru".into(),
                state: "Karnataka".into(),
                pincode: "560001".into(),
                ..AddressInput::default()
            },
            payment_method: method,
            coupon_code: None,
            notes: None,
        };
        self.storefront.create_order(request).await.unwrap().order
    }

    pub async fn advance(&self, order: &Order, status: OrderStatus) -> Order {
        self.storefront.update_status(order.id_typed(), StatusUpdate::to(status)).await.unwrap()
    }
}
