//! `storefront-auth`: authentication/authorization boundary.
//!
//! Token claims, roles, permission checks and the HS256 validator. No HTTP and
//! no storage here; the API layer extracts the bearer token and calls in.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{authorize, permissions_for_roles, AuthzError, Principal};
pub use claims::{validate_claims, JwtClaims, TokenValidationError};
pub use jwt::{encode_hs256, Hs256JwtValidator, JwtError, JwtValidator};
pub use permissions::Permission;
pub use principal::PrincipalId;
pub use roles::Role;
