//! Fixtures shared by the infra unit tests.

use chrono::{TimeZone, Utc};

use storefront_catalog::ProductId;
use storefront_core::Aggregate;
use storefront_customers::CustomerId;
use storefront_inventory::StockSource;
use storefront_sales::{
    AddressInput, LineItem, LineItemId, Order, OrderCommand, OrderId, OrderTotals, PaymentMethod, PlaceOrder,
    ShippingAddress,
};

pub(crate) fn address(email: &str) -> ShippingAddress {
    ShippingAddress::from_input(AddressInput {
        first_name: "Asha".into(),
        last_name: "Rao".into(),
        email: email.into(),
        phone: "9876543210".into(),
        address: Some("12 MG Road".into()),
        city: "Bengaluru".into(),
        state: "Karnataka".into(),
        pincode: "560001".into(),
        ..AddressInput::default()
    })
    .unwrap()
}

pub(crate) fn line(product_id: ProductId, price: u64, quantity: u32, size: Option<&str>) -> LineItem {
    LineItem {
        line_id: LineItemId::generate(),
        product_id,
        name: "Classic Tee".into(),
        sku: "TEE-1".into(),
        image: None,
        price,
        discount: 0,
        unit_price: price,
        quantity,
        size: size.map(str::to_string),
        color: None,
        reserved_from: match size {
            Some(s) => StockSource::Size { size: s.to_string() },
            None => StockSource::General,
        },
    }
}

/// A placed order for one tee (2 x 500 + 50 shipping).
pub(crate) fn placed_order(method: PaymentMethod) -> Order {
    let id = OrderId::generate();
    let mut order = Order::empty(id);
    order
        .execute(&OrderCommand::PlaceOrder(PlaceOrder {
            order_id: id,
            order_number: "ORD17000000000000001".into(),
            customer_id: CustomerId::generate(),
            items: vec![line(ProductId::generate(), 500, 2, Some("M"))],
            shipping_address: address("asha@example.com"),
            totals: OrderTotals { subtotal: 1000, shipping_charges: 50, discount: 0, tax: 0, total: 1050 },
            coupon_code: None,
            payment_method: method,
            notes: None,
            occurred_at: Utc.with_ymd_and_hms(2025, 5, 10, 9, 0, 0).unwrap(),
        }))
        .unwrap();
    order
}
