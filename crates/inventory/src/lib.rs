//! Inventory-entry workflow.
//!
//! Deterministic domain logic only: the lifecycle table, the role-filtered
//! action lists, confirmation prompts, and the `InventoryEntry` aggregate that
//! enforces them. Persisting the emitted events is the caller's job.

pub mod entry;
pub mod permissions;
pub mod status;
pub mod workflow;

pub use entry::{
    Actor, CreateEntry, EntryCommand, EntryCreated, EntryEvent, EntryLine, InventoryEntry,
    InventoryEntryId, ItemsReplaced, PerformAction, ReplaceItems, StatusChanged, StockCommitted,
    StockMovement,
};
pub use permissions::{ENTRY_PERMISSIONS, can_create, can_delete, can_edit, can_view};
pub use status::{EntryStatus, EntryType};
pub use workflow::{
    ActionDecision, ActionId, ActionVariant, ConfirmationConfig, ConfirmationLevel, WorkflowAction,
    actions_for_status, available_actions_for_user, can_user_perform_action, confirmation_config,
    explain_actions_for_user, is_transition_allowed, valid_next_states,
};
