use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use storefront_auth::Permission;
use storefront_sales::OrderId;

use crate::app::dto;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/shipments/track/:awb", get(track))
        .route("/orders/:id/tracking", get(track_order))
}

/// Raw courier tracking document for an AWB.
pub async fn track(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(awb): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::SHIPMENTS_TRACK) {
        return resp;
    }

    match services.storefront().track(awb.trim()).await {
        Ok(doc) => (StatusCode::OK, Json(doc)).into_response(),
        Err(e) => services.fail(e),
    }
}

/// Tracking for an order's own AWB; 404 until one is assigned.
pub async fn track_order(
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

    match services.storefront().track_order(order_id, principal.requester()).await {
        Ok(doc) => (StatusCode::OK, Json(doc)).into_response(),
        Err(e) => services.fail(e),
    }
}
