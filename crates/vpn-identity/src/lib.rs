//! Identity and entitlement for vpn-rs.
//!
//! Registration, password authentication, bearer tokens, external identity
//! linking, subscription renewal and the entitlement check that gates every
//! connect.

mod credentials;
mod error;
mod service;
mod validate;


pub use credentials::{Argon2JwtCredentials, CredentialService};
pub use error::CredentialError;
pub use service::{IdentityService, IdentitySettings, LoginGrant, Profile};
