use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::debug;

use storefront_auth::JwtValidator;

use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

impl AuthState {
    fn principal(&self, token: &str) -> Result<PrincipalContext, StatusCode> {
        let claims = self.jwt.validate(token, Utc::now()).map_err(|e| {
            debug!(error = %e, "bearer token rejected");
            StatusCode::UNAUTHORIZED
        })?;
        Ok(PrincipalContext::new(claims.sub, claims.roles))
    }
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers())?;
    let principal = state.principal(token)?;
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

/// Like [`auth_middleware`], but a request without an `Authorization`
/// header passes through as a guest. A header that is present must be valid.
pub async fn optional_auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if req.headers().contains_key(axum::http::header::AUTHORIZATION) {
        let token = extract_bearer(req.headers())?;
        let principal = state.principal(token)?;
        req.extensions_mut().insert(principal);
    }

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}
