//! Process-wide tracing setup shared by the API binary and tests.

/// Initialize process-wide observability (JSON tracing logs).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Human-readable logs for local development (`APP_ENV=development`).
pub fn init_pretty() {
    tracing::init_pretty();
}

pub mod tracing;
