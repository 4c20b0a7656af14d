//! HTTP API: routing, authentication and request/response mapping over the
//! storefront workflows.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
