use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;

use storefront_auth::Permission;
use storefront_returns::ReturnId;

use crate::app::dto;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/returns", post(create_return))
        .route("/returns/my", get(my_returns))
}

pub fn admin_router() -> Router {
    Router::new()
        .route("/returns", get(list_returns))
        .route("/returns/:id/approve", patch(approve_return))
        .route("/returns/:id/reject", patch(reject_return))
        .route("/returns/:id/refund", patch(update_refund))
}

pub async fn create_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateReturnRequest>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::RETURNS_REQUEST) {
        return resp;
    }
    let request = match body.into_command() {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services.storefront().create_return(principal.customer_id(), request).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => services.fail(e),
    }
}

pub async fn my_returns(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::RETURNS_REQUEST) {
        return resp;
    }

    match services.storefront().list_customer_returns(principal.customer_id()).await {
        Ok(items) => (StatusCode::OK, Json(json!({ "items": items }))).into_response(),
        Err(e) => services.fail(e),
    }
}

pub async fn list_returns(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ReturnListQuery>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::RETURNS_MANAGE) {
        return resp;
    }

    match services.storefront().list_returns(query.into()).await {
        Ok(items) => (StatusCode::OK, Json(json!({ "items": items }))).into_response(),
        Err(e) => services.fail(e),
    }
}

pub async fn approve_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ApproveReturnRequest>>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::RETURNS_MANAGE) {
        return resp;
    }
    let return_id: ReturnId = match dto::parse_id(&id, "return") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let notes = body.and_then(|Json(b)| b.admin_notes);

    match services.storefront().approve_return(return_id, notes).await {
        Ok(updated) => (StatusCode::OK, Json(updated)).into_response(),
        Err(e) => services.fail(e),
    }
}

pub async fn reject_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::RejectReturnRequest>>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::RETURNS_MANAGE) {
        return resp;
    }
    let return_id: ReturnId = match dto::parse_id(&id, "return") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let reason = body.and_then(|Json(b)| b.reason);

    match services.storefront().reject_return(return_id, reason).await {
        Ok(updated) => (StatusCode::OK, Json(updated)).into_response(),
        Err(e) => services.fail(e),
    }
}

pub async fn update_refund(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReturnRefundRequest>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::RETURNS_MANAGE) {
        return resp;
    }
    let return_id: ReturnId = match dto::parse_id(&id, "return") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.storefront().update_return_refund(return_id, body.into()).await {
        Ok(updated) => (StatusCode::OK, Json(updated)).into_response(),
        Err(e) => services.fail(e),
    }
}
