//! Whole-lifecycle runs through an in-memory storefront.

use std::sync::Arc;

use serde_json::json;

use storefront_events::EventBus;
use storefront_payments::{RefundMethod, RefundStatus};
use storefront_returns::{ReturnLineRequest, ReturnStatus};
use storefront_sales::{Order, OrderStatus, PaymentMethod, PaymentStatus};

use crate::jobs::JobExecutor;
use crate::notifications::{route, Notice};
use crate::workflows::fakes::{signature, FakeCourier, Harness};
use crate::workflows::{register_job_handlers, CreateReturn, PaymentVerification, RefundUpdate, Storefront};

async fn pay_online(storefront: &Storefront, order: &Order) -> Order {
    let intent = storefront.create_intent(order.id_typed(), None).await.unwrap();
    storefront
        .verify_payment(PaymentVerification {
            order_id: Some(order.id_typed()),
            gateway_order_id: intent.gateway_order_id.clone(),
            gateway_payment_id: "pay_e2e".into(),
            signature: signature(&intent.gateway_order_id, "pay_e2e"),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn online_order_from_checkout_to_completed_return() {
    let h = Harness::new();
    let notices = h.storefront.bus().subscribe();
    FakeCourier::set(&h.courier.auto_assign, json!({"response": {"data": {"awb_code": "AWB-E2E"}}}));

    let order = h.place_order(PaymentMethod::Online).await;
    let product = order.items()[0].product_id;
    assert_eq!(h.stock(product).await.stock_quantity, 8);

    let paid = pay_online(&h.storefront, &order).await;
    assert_eq!(paid.payment_status(), PaymentStatus::Paid);

    h.advance(&order, OrderStatus::Confirmed).await;
    let courier = h.courier.clone();
    let storefront = Arc::new(h.storefront);
    let mut executor = JobExecutor::new(storefront.jobs().clone());
    register_job_handlers(&mut executor, storefront.clone());
    assert_eq!(executor.run_ready().await, 1);

    let shipped = storefront.get_order(order.id_typed(), order.customer_id()).await.unwrap();
    assert_eq!(shipped.status(), OrderStatus::Shipped);
    assert_eq!(shipped.shipment().tracking_number.as_deref(), Some("AWB-E2E"));
    assert_eq!(courier.creates.load(std::sync::atomic::Ordering::SeqCst), 1);

    let delivered = storefront
        .update_status(order.id_typed(), crate::workflows::StatusUpdate::to(OrderStatus::Delivered))
        .await
        .unwrap();
    assert!(delivered.delivered_at().is_some());

    let customer = order.customer_id().unwrap();
    let request = storefront
        .create_return(
            customer,
            CreateReturn {
                order_id: order.id_typed(),
                items: vec![ReturnLineRequest { order_item_id: order.items()[0].line_id, quantity: None, reason: None }],
                reason: "Wrong size".into(),
                description: Some("Ordered M, need L".into()),
            },
        )
        .await
        .unwrap();
    storefront.approve_return(request.id_typed(), None).await.unwrap();
    assert_eq!(h_stock(&storefront, product).await, 10);

    let completed = storefront
        .update_return_refund(
            request.id_typed(),
            RefundUpdate {
                status: RefundStatus::Completed,
                amount: None,
                method: Some(RefundMethod::Original),
                transaction_id: Some("rfnd_manual".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(completed.status(), ReturnStatus::Completed);

    let settled = storefront.get_order(order.id_typed(), None).await.unwrap();
    assert_eq!(settled.status(), OrderStatus::Returned);
    assert_eq!(settled.payment_status(), PaymentStatus::Refunded);

    let routed: Vec<Notice> = notices.drain().iter().filter_map(|e| route(e).unwrap()).collect();
    let confirmations = routed.iter().filter(|n| matches!(n, Notice::OrderConfirmed { .. })).count();
    assert_eq!(confirmations, 1, "online orders confirm once, on payment");
    assert!(routed.contains(&Notice::StatusChanged {
        order_id: order.id_typed(),
        from: OrderStatus::Shipped,
        to: OrderStatus::Delivered,
    }));
    assert!(routed.contains(&Notice::ReturnUpdated { return_id: request.id_typed() }));
}

#[tokio::test]
async fn cancelling_a_paid_order_restocks_and_refunds_in_the_background() {
    let h = Harness::new();
    let order = h.place_order(PaymentMethod::Online).await;
    let product = order.items()[0].product_id;
    pay_online(&h.storefront, &order).await;

    let cancelled = h.advance(&order, OrderStatus::Cancelled).await;
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert_eq!(h.stock(product).await.stock_quantity, 10);

    let gateway = h.gateway.clone();
    let storefront = Arc::new(h.storefront);
    let mut executor = JobExecutor::new(storefront.jobs().clone());
    register_job_handlers(&mut executor, storefront.clone());
    assert_eq!(executor.run_ready().await, 1);

    let refunded = storefront.get_order(order.id_typed(), None).await.unwrap();
    assert_eq!(refunded.payment_status(), PaymentStatus::Refunded);
    assert_eq!(gateway.refunds.lock().unwrap().as_slice(), &[("pay_e2e".to_string(), 100_000)]);

    // A second cancel attempt is illegal and leaves stock alone.
    assert!(
        storefront
            .update_status(order.id_typed(), crate::workflows::StatusUpdate::to(OrderStatus::Cancelled))
            .await
            .is_err()
    );
    assert_eq!(h_stock(&storefront, product).await, 10);
}

async fn h_stock(storefront: &Storefront, product: storefront_catalog::ProductId) -> u32 {
    storefront.catalog().product(product).await.unwrap().unwrap().stock_quantity
}
