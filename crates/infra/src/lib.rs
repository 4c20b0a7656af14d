//! Infrastructure layer: storage, external clients, background jobs and the
//! workflows that tie them to the domain crates.

pub mod command_dispatcher;
pub mod config;
pub mod external;
pub mod jobs;
pub mod ledger;
pub mod notifications;
pub mod store;
pub mod workflows;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod integration_tests;
