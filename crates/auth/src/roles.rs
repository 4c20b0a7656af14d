use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier carried in tokens. Storefront tokens use `admin` for
/// staff and `customer` for shoppers; other names are accepted and carry no
/// permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: &'static str = "admin";
    pub const CUSTOMER: &'static str = "customer";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn admin() -> Self {
        Self(Cow::Borrowed(Self::ADMIN))
    }

    pub fn customer() -> Self {
        Self(Cow::Borrowed(Self::CUSTOMER))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_admin(&self) -> bool {
        self.as_str() == Self::ADMIN
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
