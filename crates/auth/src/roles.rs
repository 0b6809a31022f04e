use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for capability lookups.
///
/// Roles stay opaque strings at this layer so an unknown role coming from a
/// token or a stale session simply resolves to no capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const GERENTE: Role = Role(Cow::Borrowed("gerente"));
    pub const SUPERVISOR: Role = Role(Cow::Borrowed("supervisor"));
    pub const OPERARIO: Role = Role(Cow::Borrowed("operario"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Role {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}
