use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::json;

use storefront_auth::Permission;
use storefront_sales::OrderId;

use crate::app::dto;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

/// The gateway callback carries its own proof (the signature).
pub fn public_router() -> Router {
    Router::new().route("/payments/verify", post(verify_payment))
}

pub fn router() -> Router {
    Router::new().route("/payments/create-intent", post(create_intent))
}

pub async fn create_intent(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateIntentRequest>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::PAYMENTS_CREATE) {
        return resp;
    }
    let order_id: OrderId = match dto::parse_id(&body.order_id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.storefront().create_intent(order_id, principal.requester()).await {
        Ok(intent) => (StatusCode::OK, Json(intent)).into_response(),
        Err(e) => services.fail(e),
    }
}

pub async fn verify_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::VerifyPaymentRequest>,
) -> axum::response::Response {
    let verification = match body.into_verification() {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.storefront().verify_payment(verification).await {
        Ok(order) => (StatusCode::OK, Json(json!({ "verified": true, "order": order }))).into_response(),
        Err(e) => services.fail(e),
    }
}
