use serde::{Deserialize, Serialize};

/// A lifecycle capability a role may hold.
///
/// `Create`, `Submit`, `Approve` and `Complete` are plain flags. `Edit`,
/// `Cancel` and `Delete` depend on how far the entity has progressed, so they
/// are checked against per-status allow-lists. `View` depends on the role's
/// [`ViewScope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Create,
    Edit,
    Submit,
    Approve,
    Complete,
    Cancel,
    Delete,
    View,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Create => "create",
            Capability::Edit => "edit",
            Capability::Submit => "submit",
            Capability::Approve => "approve",
            Capability::Complete => "complete",
            Capability::Cancel => "cancel",
            Capability::Delete => "delete",
            Capability::View => "view",
        }
    }

    /// Whether the capability is additionally gated by ownership for roles
    /// that cannot see every record.
    pub fn is_owner_scoped(&self) -> bool {
        matches!(
            self,
            Capability::Edit | Capability::Cancel | Capability::Delete | Capability::View
        )
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which records a role may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewScope {
    /// Every record, regardless of owner.
    All,
    /// Only records the actor owns.
    Own,
}
