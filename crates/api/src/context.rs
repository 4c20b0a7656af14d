use storefront_auth::{Principal, PrincipalId, Role};
use storefront_core::AggregateId;
use storefront_customers::CustomerId;

/// Principal context for a request (authenticated identity + roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId, roles: Vec<Role>) -> Self {
        Self { principal_id, roles }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }

    /// Tokens are issued to customers; the subject is the customer id.
    pub fn customer_id(&self) -> CustomerId {
        CustomerId::new(AggregateId::from_uuid(*self.principal_id.as_uuid()))
    }

    /// Ownership filter for reads: admins see everything.
    pub fn requester(&self) -> Option<CustomerId> {
        (!self.is_admin()).then(|| self.customer_id())
    }

    pub fn principal(&self) -> Principal {
        Principal::from_roles(self.principal_id, self.roles.clone())
    }
}
