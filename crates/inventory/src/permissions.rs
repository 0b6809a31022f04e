//! Role capabilities for inventory entries.

use mercaderp_auth::{Capability, Role, RoleCapabilities, RolePermissionMatrix, ViewScope};

use crate::EntryStatus;

use EntryStatus::{Approved, Cancelled, Draft, Pending};

const ADMIN: RoleCapabilities<EntryStatus> = RoleCapabilities {
    create: true,
    edit: &[Draft, Pending, Approved],
    submit: true,
    approve: true,
    complete: true,
    cancel: &[Draft, Pending, Approved],
    delete: &[Draft, Cancelled],
    view: ViewScope::All,
};

const GERENTE: RoleCapabilities<EntryStatus> = RoleCapabilities {
    create: true,
    edit: &[Draft, Pending, Approved],
    submit: true,
    approve: true,
    complete: true,
    cancel: &[Draft, Pending, Approved],
    delete: &[Draft],
    view: ViewScope::All,
};

const SUPERVISOR: RoleCapabilities<EntryStatus> = RoleCapabilities {
    create: true,
    edit: &[Draft, Pending],
    submit: true,
    approve: true,
    complete: true,
    cancel: &[Draft, Pending, Approved],
    delete: &[Draft],
    view: ViewScope::All,
};

const OPERARIO: RoleCapabilities<EntryStatus> = RoleCapabilities {
    create: true,
    edit: &[Draft],
    submit: true,
    approve: false,
    complete: false,
    cancel: &[Draft, Pending],
    delete: &[Draft],
    view: ViewScope::Own,
};

/// The single source of truth for who may do what to an inventory entry.
pub static ENTRY_PERMISSIONS: RolePermissionMatrix<EntryStatus> = RolePermissionMatrix::new(&[
    ("admin", ADMIN),
    ("gerente", GERENTE),
    ("supervisor", SUPERVISOR),
    ("operario", OPERARIO),
]);

pub fn can_create(role: &Role) -> bool {
    ENTRY_PERMISSIONS.allows(role, Capability::Create, &Draft, false)
}

pub fn can_edit(role: &Role, status: EntryStatus, is_owner: bool) -> bool {
    ENTRY_PERMISSIONS.allows(role, Capability::Edit, &status, is_owner)
}

pub fn can_delete(role: &Role, status: EntryStatus, is_owner: bool) -> bool {
    ENTRY_PERMISSIONS.allows(role, Capability::Delete, &status, is_owner)
}

pub fn can_view(role: &Role, is_owner: bool) -> bool {
    ENTRY_PERMISSIONS
        .capabilities(role)
        .is_some_and(|caps| caps.can_view_all() || is_owner)
}
