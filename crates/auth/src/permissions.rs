use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier (e.g. `"orders.manage"`). The wildcard `"*"` grants
/// everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    /// Read own orders and their tracking.
    pub const ORDERS_READ_OWN: Permission = Permission(Cow::Borrowed("orders.read_own"));
    /// Status changes, manual payment, refunds, shipments, listings.
    pub const ORDERS_MANAGE: Permission = Permission(Cow::Borrowed("orders.manage"));
    pub const PAYMENTS_CREATE: Permission = Permission(Cow::Borrowed("payments.create"));
    pub const RETURNS_REQUEST: Permission = Permission(Cow::Borrowed("returns.request"));
    pub const RETURNS_MANAGE: Permission = Permission(Cow::Borrowed("returns.manage"));
    pub const SHIPMENTS_TRACK: Permission = Permission(Cow::Borrowed("shipments.track"));
    pub const JOBS_MANAGE: Permission = Permission(Cow::Borrowed("jobs.manage"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
