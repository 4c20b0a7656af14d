use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use storefront_infra::jobs::JobStoreError;
use storefront_infra::workflows::WorkflowError;

/// Render a workflow failure. Internal details are only exposed when
/// `verbose` (development mode) is on.
pub fn workflow_error_to_response(err: WorkflowError, verbose: bool) -> axum::response::Response {
    match err {
        WorkflowError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        WorkflowError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        WorkflowError::Forbidden => json_error(StatusCode::FORBIDDEN, "forbidden", "Access denied"),
        WorkflowError::InvalidTransition(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        WorkflowError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        WorkflowError::AlreadyExists(what) => {
            json_error(StatusCode::BAD_REQUEST, "already_exists", format!("{what} already exists"))
        }
        WorkflowError::NotConfigured(service) => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "not_configured",
            format!("{service} is not configured"),
        ),
        e @ WorkflowError::Upstream { .. } => json_error(StatusCode::BAD_GATEWAY, "upstream_error", e.to_string()),
        WorkflowError::Internal(msg) => {
            error!(error = %msg, "request failed");
            let message = if verbose { msg } else { "Internal server error".to_string() };
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
        }
    }
}

pub fn job_error_to_response(err: JobStoreError) -> axum::response::Response {
    match err {
        JobStoreError::NotFound(id) => json_error(StatusCode::NOT_FOUND, "not_found", format!("job {id} not found")),
        other => {
            error!(error = %other, "job store failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "Internal server error")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn invalid_id(what: &str) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id"))
}
