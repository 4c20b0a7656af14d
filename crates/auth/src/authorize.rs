use std::collections::HashSet;

use thiserror::Error;

use crate::{Permission, PrincipalId, Role};

/// A principal resolved from token claims, ready for policy checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn from_roles(principal_id: PrincipalId, roles: Vec<Role>) -> Self {
        let permissions = permissions_for_roles(&roles);
        Self { principal_id, roles, permissions }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Static role policy: admins hold the wildcard, customers a fixed set.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    if roles.iter().any(Role::is_admin) {
        return vec![Permission::WILDCARD];
    }
    if roles.iter().any(|r| r.as_str() == Role::CUSTOMER) {
        return vec![
            Permission::ORDERS_READ_OWN,
            Permission::PAYMENTS_CREATE,
            Permission::RETURNS_REQUEST,
        ];
    }
    Vec::new()
}

/// Pure policy check; no IO.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let perms: HashSet<&str> = principal.permissions.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
