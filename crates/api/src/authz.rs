//! API-side authorization guard.
//!
//! Checked in the handler before any workflow runs, so the workflows stay
//! auth-agnostic apart from ownership.

use axum::http::StatusCode;
use axum::response::Response;

use storefront_auth::{authorize, Permission};

use crate::app::errors::json_error;
use crate::context::PrincipalContext;

/// Require `permission` for the current principal.
pub fn require(principal: &PrincipalContext, permission: &Permission) -> Result<(), Response> {
    authorize(&principal.principal(), permission)
        .map_err(|e| json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()))
}
