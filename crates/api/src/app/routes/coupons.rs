use std::sync::Arc;

use axum::{
    extract::Extension,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use crate::app::dto;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new().route("/coupons/validate", post(validate_coupon))
}

/// Evaluate a coupon without redeeming it. First-order coupons need a
/// signed-in customer to be judged.
pub async fn validate_coupon(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Json(body): Json<dto::ValidateCouponRequest>,
) -> axum::response::Response {
    let customer_id = principal.map(|Extension(p)| p.customer_id());
    let check = services
        .storefront()
        .validate_coupon(&body.code, body.subtotal, body.total_quantity.unwrap_or(1), customer_id)
        .await;

    match check {
        Ok(check) => {
            let (status, body) = dto::coupon_check_to_json(&check);
            (status, Json(body)).into_response()
        }
        Err(e) => services.fail(e),
    }
}
