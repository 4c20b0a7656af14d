//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection, external clients, background workers
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use storefront_infra::config::AppConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{build_services, AppServices, Background, BootstrapError};

/// Build the full HTTP router around already-wired services.
pub fn router(services: Arc<AppServices>, jwt_secret: &str) -> Router {
    let jwt = Arc::new(storefront_auth::Hs256JwtValidator::new(jwt_secret.as_bytes().to_vec()));
    let auth_state = middleware::AuthState { jwt };

    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state.clone(),
        middleware::auth_middleware,
    ));
    let optional = routes::optional_auth_router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::optional_auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::public_router())
        .merge(optional)
        .merge(protected)
        .layer(Extension(services))
        .layer(ServiceBuilder::new())
}

/// Wire services from `config` and build the router (public entrypoint used
/// by `main.rs`).
pub async fn build_app(config: &AppConfig) -> Result<(Router, Arc<AppServices>), BootstrapError> {
    let services = Arc::new(build_services(config).await?);
    Ok((router(services.clone(), &config.jwt_secret), services))
}
