//! Static role × status capability table.
//!
//! The table is data, not control flow: adding a role or a status means adding
//! a row or extending an allow-list, never a new branch. Lookups are pure and
//! fail closed (an unknown role has no capabilities).

use serde::Serialize;

use crate::{Capability, Role, ViewScope};

/// Everything one role may do, keyed by the entity status where it matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleCapabilities<S: 'static> {
    pub create: bool,
    /// Statuses in which the role may edit an entity.
    pub edit: &'static [S],
    pub submit: bool,
    pub approve: bool,
    pub complete: bool,
    /// Statuses in which the role may cancel an entity.
    pub cancel: &'static [S],
    /// Statuses in which the role may delete an entity.
    pub delete: &'static [S],
    pub view: ViewScope,
}

impl<S: PartialEq + 'static> RoleCapabilities<S> {
    pub fn can_view_all(&self) -> bool {
        self.view == ViewScope::All
    }

    /// Check a capability for an entity in `status`.
    pub fn grants(&self, capability: Capability, status: &S, is_owner: bool) -> bool {
        self.check(capability, status, is_owner).is_none()
    }

    /// `None` when granted, otherwise why not.
    fn check(&self, capability: Capability, status: &S, is_owner: bool) -> Option<DenialKind> {
        let allowed = match capability {
            Capability::Create => self.create,
            Capability::Submit => self.submit,
            Capability::Approve => self.approve,
            Capability::Complete => self.complete,
            Capability::View => true,
            Capability::Edit => self.edit.contains(status),
            Capability::Cancel => self.cancel.contains(status),
            Capability::Delete => self.delete.contains(status),
        };

        if !allowed {
            return Some(match capability {
                Capability::Edit | Capability::Cancel | Capability::Delete => {
                    DenialKind::StatusNotAllowed
                }
                _ => DenialKind::MissingCapability,
            });
        }

        if capability.is_owner_scoped() && !self.can_view_all() && !is_owner {
            return Some(DenialKind::NotOwner);
        }

        None
    }
}

/// Read-only role → capabilities table, safe to share without locking.
#[derive(Debug, Clone, Copy)]
pub struct RolePermissionMatrix<S: 'static> {
    rows: &'static [(&'static str, RoleCapabilities<S>)],
}

impl<S: PartialEq + core::fmt::Debug + 'static> RolePermissionMatrix<S> {
    pub const fn new(rows: &'static [(&'static str, RoleCapabilities<S>)]) -> Self {
        Self { rows }
    }

    /// Capabilities of `role`, or `None` for a role the table does not know.
    pub fn capabilities(&self, role: &Role) -> Option<&'static RoleCapabilities<S>> {
        let found = self
            .rows
            .iter()
            .find(|(name, _)| *name == role.as_str())
            .map(|(_, caps)| caps);
        if found.is_none() {
            tracing::debug!(role = %role, "unknown role; no capabilities granted");
        }
        found
    }

    /// Known role names, in table order.
    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.rows.iter().map(|(name, _)| Role::new(*name))
    }

    /// Fail-closed capability check.
    pub fn allows(&self, role: &Role, capability: Capability, status: &S, is_owner: bool) -> bool {
        self.capabilities(role)
            .is_some_and(|caps| caps.grants(capability, status, is_owner))
    }

    /// Explain why a capability is (or is not) granted.
    ///
    /// Same decision as [`RolePermissionMatrix::allows`], with a
    /// human-readable reason for audit trails and "why is this button
    /// missing" questions.
    pub fn explain(
        &self,
        role: &Role,
        capability: Capability,
        status: &S,
        is_owner: bool,
    ) -> AuthorizationExplanation {
        let denial = match self.capabilities(role) {
            None => Some(DenialKind::UnknownRole),
            Some(caps) => caps.check(capability, status, is_owner),
        };

        let reason = match denial {
            None => format!("role '{role}' may {capability} in status {status:?}"),
            Some(DenialKind::UnknownRole) => {
                format!("role '{role}' is not defined; nothing is granted")
            }
            Some(DenialKind::MissingCapability) => {
                format!("role '{role}' does not hold the '{capability}' capability")
            }
            Some(DenialKind::StatusNotAllowed) => {
                format!("role '{role}' may not {capability} in status {status:?}")
            }
            Some(DenialKind::NotOwner) => format!(
                "role '{role}' may only {capability} records it owns"
            ),
        };

        AuthorizationExplanation {
            role: role.as_str().to_string(),
            capability,
            granted: denial.is_none(),
            reason,
            denial,
        }
    }
}

/// Outcome of [`RolePermissionMatrix::explain`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationExplanation {
    pub role: String,
    pub capability: Capability,
    pub granted: bool,
    pub reason: String,
    pub denial: Option<DenialKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    UnknownRole,
    MissingCapability,
    StatusNotAllowed,
    NotOwner,
}
