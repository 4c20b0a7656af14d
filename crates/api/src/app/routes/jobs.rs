use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use storefront_auth::Permission;
use storefront_infra::jobs::{JobId, JobStore};

use crate::app::dto;
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

const DEFAULT_LIMIT: usize = 50;

pub fn admin_router() -> Router {
    Router::new()
        .route("/jobs/dead-letters", get(list_dead_letters))
        .route("/jobs/dead-letters/:id/retry", post(retry_dead_letter))
}

pub async fn list_dead_letters(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::DeadLetterQuery>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::JOBS_MANAGE) {
        return resp;
    }

    let jobs = services.storefront().jobs();
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    match (jobs.list_dead_letters(limit), jobs.stats()) {
        (Ok(items), Ok(stats)) => (StatusCode::OK, Json(json!({ "items": items, "stats": stats }))).into_response(),
        (Err(e), _) | (_, Err(e)) => errors::job_error_to_response(e),
    }
}

pub async fn retry_dead_letter(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &Permission::JOBS_MANAGE) {
        return resp;
    }
    let job_id: JobId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("job"),
    };

    match services.storefront().jobs().retry_dead_letter(job_id) {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}
