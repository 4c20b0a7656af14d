use serde::Serialize;

use storefront_core::{Amount, DomainError, DomainResult};
use storefront_sales::{Order, OrderStatus, PaymentMethod};

use crate::parcel::{normalize_phone, normalize_pincode, parcel_weight_kg, Dimensions, PARCEL_DIMENSIONS};

const FALLBACK_PHONE: &str = "9999999999";
const FALLBACK_EMAIL: &str = "noreply@example.com";
const FALLBACK_PINCODE: &str = "000000";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateOrderItem {
    pub name: String,
    pub sku: String,
    pub units: u32,
    pub unit_price: Amount,
    pub selling_price: Amount,
    pub is_document: u8,
}

/// Body of the aggregator's ad-hoc create-order call. Billing and shipping
/// carry the same contact since `shipping_is_billing` is always set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateOrderPayload {
    pub order_id: String,
    pub order_date: String,
    pub channel_id: String,
    pub pickup_location: String,
    pub billing_customer_name: String,
    pub billing_last_name: String,
    pub billing_address: String,
    pub billing_address_2: String,
    pub billing_city: String,
    pub billing_pincode: String,
    pub billing_state: String,
    pub billing_country: String,
    pub billing_email: String,
    pub billing_phone: String,
    pub shipping_customer_name: String,
    pub shipping_last_name: String,
    pub shipping_address: String,
    pub shipping_address_2: String,
    pub shipping_city: String,
    pub shipping_pincode: String,
    pub shipping_state: String,
    pub shipping_country: String,
    pub shipping_email: String,
    pub shipping_phone: String,
    pub shipping_is_billing: String,
    pub order_items: Vec<CreateOrderItem>,
    pub payment_method: String,
    pub sub_total: Amount,
    #[serde(flatten)]
    pub dimensions: Dimensions,
    pub weight: f64,
}

fn clip(value: &str, max: usize, fallback: &str) -> String {
    let trimmed: String = value.trim().chars().take(max).collect();
    if trimmed.is_empty() { fallback.to_string() } else { trimmed }
}

/// Orders that were cancelled or returned never reach the courier.
pub fn ensure_shippable(order: &Order) -> DomainResult<()> {
    match order.status() {
        OrderStatus::Cancelled | OrderStatus::Returned => Err(DomainError::validation(
            "Cannot create shipment for cancelled or returned order",
        )),
        _ => Ok(()),
    }
}

pub fn build_create_order(order: &Order, pickup_location: &str) -> DomainResult<CreateOrderPayload> {
    ensure_shippable(order)?;
    let addr = order
        .shipping_address()
        .ok_or_else(|| DomainError::validation("Order has no shipping address"))?;

    let mut name_parts = addr.name.split_whitespace();
    let first_source = if addr.first_name.trim().is_empty() {
        name_parts.next().unwrap_or_default().to_string()
    } else {
        addr.first_name.clone()
    };
    let last_source = if addr.last_name.trim().is_empty() {
        name_parts.collect::<Vec<_>>().join(" ")
    } else {
        addr.last_name.clone()
    };
    let first_name = clip(&first_source, 50, "Customer");
    let last_name = clip(&last_source, 50, "-");

    let address = clip(&addr.street, 200, "Address");
    let address_2 = clip(&addr.landmark, 100, "");
    let city = clip(&addr.city, 50, "City");
    let state = clip(&addr.state, 50, "State");
    let pincode = normalize_pincode(&addr.pincode, FALLBACK_PINCODE);
    let country = clip(&addr.country, 50, "India");
    let email = clip(&addr.email, 200, FALLBACK_EMAIL);
    let phone = match normalize_phone(&addr.phone) {
        p if p.is_empty() => FALLBACK_PHONE.to_string(),
        p => p,
    };

    let mut order_items: Vec<CreateOrderItem> = order
        .items()
        .iter()
        .map(|item| CreateOrderItem {
            name: clip(&item.name, 100, "Product"),
            sku: clip(&item.sku, 50, "SKU"),
            units: item.quantity.max(1),
            unit_price: item.unit_price,
            selling_price: item.unit_price,
            is_document: 0,
        })
        .collect();
    if order_items.is_empty() {
        order_items.push(CreateOrderItem {
            name: "Product".into(),
            sku: "NA".into(),
            units: 1,
            unit_price: 0,
            selling_price: 0,
            is_document: 0,
        });
    }

    let order_date = order
        .created_at()
        .map(|at| at.format("%Y-%m-%d").to_string())
        .unwrap_or_default();

    let payment_method = match order.payment_method() {
        PaymentMethod::Cod => "COD",
        _ => "Prepaid",
    };

    Ok(CreateOrderPayload {
        order_id: order.order_number().to_string(),
        order_date,
        channel_id: String::new(),
        pickup_location: pickup_location.to_string(),
        billing_customer_name: first_name.clone(),
        billing_last_name: last_name.clone(),
        billing_address: address.clone(),
        billing_address_2: address_2.clone(),
        billing_city: city.clone(),
        billing_pincode: pincode.clone(),
        billing_state: state.clone(),
        billing_country: country.clone(),
        billing_email: email.clone(),
        billing_phone: phone.clone(),
        shipping_customer_name: first_name,
        shipping_last_name: last_name,
        shipping_address: address,
        shipping_address_2: address_2,
        shipping_city: city,
        shipping_pincode: pincode,
        shipping_state: state,
        shipping_country: country,
        shipping_email: email,
        shipping_phone: phone,
        shipping_is_billing: "1".into(),
        order_items,
        payment_method: payment_method.into(),
        sub_total: order.total(),
        dimensions: PARCEL_DIMENSIONS,
        weight: parcel_weight_kg(order.total_quantity()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use storefront_catalog::ProductId;
    use storefront_core::Aggregate;
    use storefront_customers::CustomerId;
    use storefront_inventory::StockSource;
    use storefront_sales::{
        AddressInput, LineItem, LineItemId, OrderCommand, OrderId, OrderTotals, PlaceOrder,
        ShippingAddress, UpdateStatus,
    };

    fn line(name: &str, price: Amount, quantity: u32) -> LineItem {
        LineItem {
            line_id: LineItemId::generate(),
            product_id: ProductId::generate(),
            name: name.into(),
            sku: "TEE-1".into(),
            image: None,
            price,
            discount: 0,
            unit_price: price,
            quantity,
            size: Some("M".into()),
            color: None,
            reserved_from: StockSource::General,
        }
    }

    fn order_with(phone: &str, pincode: &str, method: PaymentMethod) -> Order {
        let id = OrderId::generate();
        let shipping_address = ShippingAddress::from_input(AddressInput {
            first_name: "Asha".into(),
            last_name: "Rao".into(),
            email: "asha@example.com".into(),
            phone: phone.into(),
            address: Some("12 MG Road".into()),
            city: "Bengaluru".into(),
            state: "Karnataka".into(),
            pincode: pincode.into(),
            landmark: Some("Near Metro".into()),
            ..AddressInput::default()
        })
        .unwrap();
        let mut order = Order::empty(id);
        order
            .execute(&OrderCommand::PlaceOrder(PlaceOrder {
                order_id: id,
                order_number: "ORD17000000000000042".into(),
                customer_id: CustomerId::generate(),
                items: vec![line("Classic Tee", 500, 2), line("Cap", 250, 3)],
                shipping_address,
                totals: OrderTotals { subtotal: 1750, shipping_charges: 50, discount: 0, tax: 0, total: 1800 },
                coupon_code: None,
                payment_method: method,
                notes: None,
                occurred_at: Utc.with_ymd_and_hms(2025, 5, 10, 23, 30, 0).unwrap(),
            }))
            .unwrap();
        order
    }

    #[test]
    fn payload_carries_order_contact_and_parcel() {
        let order = order_with("+91-98765 43210", "560 001", PaymentMethod::Cod);
        let p = build_create_order(&order, "Primary").unwrap();

        assert_eq!(p.order_id, "ORD17000000000000042");
        assert_eq!(p.order_date, "2025-05-10");
        assert_eq!(p.pickup_location, "Primary");
        assert_eq!(p.billing_customer_name, "Asha");
        assert_eq!(p.billing_last_name, "Rao");
        assert_eq!(p.billing_address, "12 MG Road");
        assert_eq!(p.billing_address_2, "Near Metro");
        assert_eq!(p.billing_phone, "9876543210");
        assert_eq!(p.shipping_pincode, "560001");
        assert_eq!(p.shipping_country, "India");
        assert_eq!(p.payment_method, "COD");
        assert_eq!(p.sub_total, 1800);
        assert_eq!(p.weight, 2.5);
        assert_eq!(p.order_items.len(), 2);
        assert_eq!(p.order_items[1].units, 3);
        assert_eq!(p.order_items[1].selling_price, 250);
    }

    #[test]
    fn online_orders_are_prepaid_and_blank_contact_falls_back() {
        let order = order_with("", "", PaymentMethod::Online);
        let p = build_create_order(&order, "Primary").unwrap();
        assert_eq!(p.payment_method, "Prepaid");
        assert_eq!(p.billing_phone, "9999999999");
        assert_eq!(p.billing_pincode, "000000");
    }

    #[test]
    fn serialises_dimensions_flat() {
        let order = order_with("9876543210", "560001", PaymentMethod::Cod);
        let json = serde_json::to_value(build_create_order(&order, "Primary").unwrap()).unwrap();
        assert_eq!(json["length"], 15);
        assert_eq!(json["height"], 10);
        assert_eq!(json["shipping_is_billing"], "1");
    }

    #[test]
    fn cancelled_orders_are_not_shippable() {
        let mut order = order_with("9876543210", "560001", PaymentMethod::Cod);
        order
            .execute(&OrderCommand::UpdateStatus(UpdateStatus::to(
                order.id_typed(),
                OrderStatus::Cancelled,
                Utc.with_ymd_and_hms(2025, 5, 11, 8, 0, 0).unwrap(),
            )))
            .unwrap();
        let err = build_create_order(&order, "Primary").unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("cancelled or returned")));
    }
}
