use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;

use storefront_auth::Permission;
use storefront_sales::OrderId;

use crate::app::dto;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

/// Checkout. Runs behind the optional-auth layer.
pub fn checkout_router() -> Router {
    Router::new().route("/orders", post(create_order))
}

/// Customer reads.
pub fn router() -> Router {
    Router::new()
        .route("/orders/my", get(my_orders))
        .route("/orders/:id", get(get_order))
}

pub fn admin_router() -> Router {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/:id/status", patch(update_status))
        .route("/orders/:id/mark-paid", post(mark_paid))
        .route("/orders/:id/refund", post(refund_order))
        .route("/orders/:id/shipment", post(create_shipment))
        .route("/orders/:id/sync-tracking", post(sync_tracking))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    let customer_id = principal.map(|Extension(p)| p.customer_id());
    let request = match body.into_checkout(customer_id) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services.storefront().create_order(request).await {
        Ok(receipt) => (StatusCode::CREATED, Json(dto::checkout_to_json(&receipt))).into_response(),
        Err(e) => services.fail(e),
    }
}

pub async fn my_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::ORDERS_READ_OWN) {
        return resp;
    }

    match services.storefront().list_customer_orders(principal.customer_id()).await {
        Ok(orders) => (StatusCode::OK, Json(json!({ "items": orders }))).into_response(),
        Err(e) => services.fail(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::ORDERS_READ_OWN) {
        return resp;
    }
    let order_id: OrderId = match dto::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let storefront = services.storefront();
    match storefront.get_order(order_id, principal.requester()).await {
        Ok(order) => {
            let order = storefront.reconcile(order).await;
            (StatusCode::OK, Json(order)).into_response()
        }
        Err(e) => services.fail(e),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::OrderListQuery>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::ORDERS_MANAGE) {
        return resp;
    }
    let filter = match query.into_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    match services.storefront().list_orders(filter).await {
        Ok(orders) => (StatusCode::OK, Json(json!({ "items": orders }))).into_response(),
        Err(e) => services.fail(e),
    }
}

pub async fn update_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateStatusRequest>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::ORDERS_MANAGE) {
        return resp;
    }
    let order_id: OrderId = match dto::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let update = match body.into_update() {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    match services.storefront().update_status(order_id, update).await {
        Ok(order) => (StatusCode::OK, Json(order)).into_response(),
        Err(e) => services.fail(e),
    }
}

pub async fn mark_paid(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::ORDERS_MANAGE) {
        return resp;
    }
    let order_id: OrderId = match dto::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.storefront().mark_paid(order_id).await {
        Ok(order) => (StatusCode::OK, Json(order)).into_response(),
        Err(e) => services.fail(e),
    }
}

pub async fn refund_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::ORDERS_MANAGE) {
        return resp;
    }
    let order_id: OrderId = match dto::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.storefront().refund_order(order_id).await {
        Ok(outcome) => (StatusCode::OK, Json(dto::refund_outcome_to_json(&outcome))).into_response(),
        Err(e) => services.fail(e),
    }
}

pub async fn create_shipment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ShipmentRequest>>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::ORDERS_MANAGE) {
        return resp;
    }
    let order_id: OrderId = match dto::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let courier_id = body.and_then(|Json(b)| b.courier_id);

    // No settle delay on the request path; a missing AWB is picked up by the
    // queued re-fetch.
    match services
        .storefront()
        .create_shipment(order_id, courier_id.as_deref(), Duration::ZERO)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({ "assigned": outcome.assigned, "order": outcome.order })),
        )
            .into_response(),
        Err(e) => services.fail(e),
    }
}

pub async fn sync_tracking(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::ORDERS_MANAGE) {
        return resp;
    }
    let order_id: OrderId = match dto::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.storefront().sync_tracking(order_id).await {
        Ok(order) => (StatusCode::OK, Json(order)).into_response(),
        Err(e) => services.fail(e),
    }
}
