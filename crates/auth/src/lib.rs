//! `mercaderp-auth`: role-gated capability checks.
//!
//! Decoupled from HTTP, tokens and storage: callers resolve the actor's role
//! elsewhere and ask this crate what that role may do.

pub mod capability;
pub mod matrix;
pub mod roles;

pub use capability::{Capability, ViewScope};
pub use matrix::{
    AuthorizationExplanation, DenialKind, RoleCapabilities, RolePermissionMatrix,
};
pub use roles::Role;
