//! Inventory-entry lifecycle: transition table, per-status actions,
//! role filtering and confirmation prompts.
//!
//! Everything here is a pure lookup over static tables, so it can be called
//! concurrently from any number of request handlers without locking.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use mercaderp_auth::{AuthorizationExplanation, Capability, Role};
use mercaderp_core::DomainError;

use crate::permissions::ENTRY_PERMISSIONS;
use crate::EntryStatus;

use EntryStatus::{Approved, Cancelled, Completed, Draft, Pending};

/// Allowed-transition table. Terminal statuses have no row entries.
static TRANSITIONS: [(EntryStatus, &[EntryStatus]); 5] = [
    (Draft, &[Pending, Approved, Cancelled]),
    (Pending, &[Approved, Cancelled]),
    (Approved, &[Completed, Cancelled]),
    (Completed, &[]),
    (Cancelled, &[]),
];

/// Statuses reachable from `current`, in table order.
pub fn valid_next_states(current: EntryStatus) -> &'static [EntryStatus] {
    TRANSITIONS
        .iter()
        .find(|(from, _)| *from == current)
        .map(|(_, next)| *next)
        .unwrap_or(&[])
}

pub fn is_transition_allowed(current: EntryStatus, target: EntryStatus) -> bool {
    valid_next_states(current).contains(&target)
}

/// Identifier of a workflow action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionId {
    Submit,
    ApproveDirect,
    Approve,
    Complete,
    Cancel,
}

impl ActionId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionId::Submit => "submit",
            ActionId::ApproveDirect => "approve_direct",
            ActionId::Approve => "approve",
            ActionId::Complete => "complete",
            ActionId::Cancel => "cancel",
        }
    }

    /// Status the action moves an entry into.
    pub fn target(&self) -> EntryStatus {
        match self {
            ActionId::Submit => Pending,
            ActionId::ApproveDirect | ActionId::Approve => Approved,
            ActionId::Complete => Completed,
            ActionId::Cancel => Cancelled,
        }
    }
}

impl core::fmt::Display for ActionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            ActionId::Submit,
            ActionId::ApproveDirect,
            ActionId::Approve,
            ActionId::Complete,
            ActionId::Cancel,
        ]
        .into_iter()
        .find(|id| id.as_str() == s)
        .ok_or_else(|| DomainError::validation(format!("unknown workflow action '{s}'")))
    }
}

/// How loudly the UI should render the action button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionVariant {
    Primary,
    Success,
    Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationLevel {
    Standard,
    Warning,
    Critical,
}

/// A named transition offered from a given status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkflowAction {
    pub id: ActionId,
    pub label: &'static str,
    pub target: EntryStatus,
    pub variant: ActionVariant,
    pub confirmation: ConfirmationLevel,
    pub description: &'static str,
    /// Capability the actor's role must hold for this action to be offered.
    pub requires: Capability,
}

const SUBMIT: WorkflowAction = WorkflowAction {
    id: ActionId::Submit,
    label: "Submit for approval",
    target: Pending,
    variant: ActionVariant::Primary,
    confirmation: ConfirmationLevel::Standard,
    description: "Send the entry for review; items become read-only",
    requires: Capability::Submit,
};

const APPROVE_DIRECT: WorkflowAction = WorkflowAction {
    id: ActionId::ApproveDirect,
    label: "Approve directly",
    target: Approved,
    variant: ActionVariant::Success,
    confirmation: ConfirmationLevel::Warning,
    description: "Approve the entry without the review step",
    requires: Capability::Approve,
};

const APPROVE: WorkflowAction = WorkflowAction {
    id: ActionId::Approve,
    label: "Approve",
    target: Approved,
    variant: ActionVariant::Success,
    confirmation: ConfirmationLevel::Standard,
    description: "Approve the reviewed entry",
    requires: Capability::Approve,
};

const COMPLETE: WorkflowAction = WorkflowAction {
    id: ActionId::Complete,
    label: "Complete",
    target: Completed,
    variant: ActionVariant::Success,
    confirmation: ConfirmationLevel::Critical,
    description: "Post the entry and increment on-hand stock",
    requires: Capability::Complete,
};

const CANCEL: WorkflowAction = WorkflowAction {
    id: ActionId::Cancel,
    label: "Cancel",
    target: Cancelled,
    variant: ActionVariant::Danger,
    confirmation: ConfirmationLevel::Warning,
    description: "Cancel the entry; it becomes read-only",
    requires: Capability::Cancel,
};

static ACTIONS: [(EntryStatus, &[WorkflowAction]); 5] = [
    (Draft, &[SUBMIT, APPROVE_DIRECT, CANCEL]),
    (Pending, &[APPROVE, CANCEL]),
    (Approved, &[COMPLETE, CANCEL]),
    (Completed, &[]),
    (Cancelled, &[]),
];

/// Every action defined for `status`, before role filtering.
pub fn actions_for_status(status: EntryStatus) -> &'static [WorkflowAction] {
    ACTIONS
        .iter()
        .find(|(from, _)| *from == status)
        .map(|(_, actions)| *actions)
        .unwrap_or(&[])
}

/// Actions `role` may invoke on an entry in `status`.
///
/// Keeps the static definition order. An unknown role gets an empty list.
pub fn available_actions_for_user(
    status: EntryStatus,
    role: &Role,
    is_owner: bool,
) -> Vec<WorkflowAction> {
    let Some(caps) = ENTRY_PERMISSIONS.capabilities(role) else {
        return Vec::new();
    };

    actions_for_status(status)
        .iter()
        .filter(|action| is_transition_allowed(status, action.target))
        .filter(|action| caps.grants(action.requires, &status, is_owner))
        .copied()
        .collect()
}

pub fn can_user_perform_action(
    action_id: ActionId,
    status: EntryStatus,
    role: &Role,
    is_owner: bool,
) -> bool {
    available_actions_for_user(status, role, is_owner)
        .iter()
        .any(|action| action.id == action_id)
}

/// An action from the status list together with the permission decision
/// behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionDecision {
    pub action: WorkflowAction,
    pub explanation: AuthorizationExplanation,
}

/// Every action defined for `status`, each with why `role` is or is not
/// offered it. The granted ones are exactly `available_actions_for_user`.
pub fn explain_actions_for_user(status: EntryStatus, role: &Role, is_owner: bool) -> Vec<ActionDecision> {
    actions_for_status(status)
        .iter()
        .map(|action| ActionDecision {
            action: *action,
            explanation: ENTRY_PERMISSIONS.explain(role, action.requires, &status, is_owner),
        })
        .collect()
}

/// Content of the confirmation dialog shown before an action runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationConfig {
    pub title: String,
    pub description: String,
    pub confirm_label: String,
    pub cancel_label: String,
    pub severity: ConfirmationLevel,
}

/// Build the confirmation prompt for `action` on entry `entry_number`.
///
/// `complete` is always critical: it is the only action that changes
/// physical stock, and that cannot be undone.
pub fn confirmation_config(
    action: &WorkflowAction,
    entry_number: &str,
    entry_type_label: &str,
) -> ConfirmationConfig {
    let subject = format!("Entry {entry_number} ({entry_type_label})");

    let (title, description, confirm_label, severity) = match action.id {
        ActionId::Submit => (
            "Submit entry for approval",
            format!("{subject} will be sent for approval. Its items can no longer be edited."),
            "Submit",
            ConfirmationLevel::Standard,
        ),
        ActionId::ApproveDirect => (
            "Approve entry directly",
            format!("{subject} will be approved without going through review."),
            "Approve",
            ConfirmationLevel::Warning,
        ),
        ActionId::Approve => (
            "Approve entry",
            format!("{subject} will be approved and become ready to complete."),
            "Approve",
            ConfirmationLevel::Standard,
        ),
        ActionId::Complete => (
            "Complete entry",
            format!(
                "{subject} will be completed. Every item will be added to on-hand stock. \
                 This stock movement is permanent and cannot be reverted."
            ),
            "Complete and update stock",
            ConfirmationLevel::Critical,
        ),
        ActionId::Cancel => (
            "Cancel entry",
            format!("{subject} will be cancelled and become read-only."),
            "Cancel entry",
            ConfirmationLevel::Warning,
        ),
    };

    ConfirmationConfig {
        title: title.to_string(),
        description,
        confirm_label: confirm_label.to_string(),
        cancel_label: "Go back".to_string(),
        severity,
    }
}
