use axum::Router;

pub mod coupons;
pub mod jobs;
pub mod orders;
pub mod payments;
pub mod returns;
pub mod shipments;
pub mod system;

/// Open routes: guests may call these, a valid bearer token binds the customer.
pub fn optional_auth_router() -> Router {
    Router::new()
        .merge(orders::checkout_router())
        .merge(coupons::router())
}

/// Routes that need no identity at all.
pub fn public_router() -> Router {
    payments::public_router()
}

/// Authenticated routes. Each handler checks its own permission.
pub fn router() -> Router {
    Router::new()
        .merge(orders::router())
        .merge(payments::router())
        .merge(returns::router())
        .merge(shipments::router())
        .nest("/admin", admin_router())
}

fn admin_router() -> Router {
    Router::new()
        .merge(orders::admin_router())
        .merge(returns::admin_router())
        .merge(jobs::admin_router())
}
