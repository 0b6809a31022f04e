use core::str::FromStr;

use serde::{Deserialize, Serialize};

use mercaderp_core::DomainError;

/// Lifecycle status of an inventory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Draft,
    Pending,
    Approved,
    Completed,
    Cancelled,
}

impl EntryStatus {
    pub const ALL: [EntryStatus; 5] = [
        EntryStatus::Draft,
        EntryStatus::Pending,
        EntryStatus::Approved,
        EntryStatus::Completed,
        EntryStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Draft => "draft",
            EntryStatus::Pending => "pending",
            EntryStatus::Approved => "approved",
            EntryStatus::Completed => "completed",
            EntryStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal entries are read-only.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryStatus::Completed | EntryStatus::Cancelled)
    }
}

impl core::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown entry status '{s}'")))
    }
}

/// Kind of stock movement an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Production,
    Return,
    Adjustment,
    Initial,
}

impl EntryType {
    pub const ALL: [EntryType; 4] = [
        EntryType::Production,
        EntryType::Return,
        EntryType::Adjustment,
        EntryType::Initial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Production => "production",
            EntryType::Return => "return",
            EntryType::Adjustment => "adjustment",
            EntryType::Initial => "initial",
        }
    }

    /// Operator-facing label used in confirmation prompts.
    pub fn label(&self) -> &'static str {
        match self {
            EntryType::Production => "Production",
            EntryType::Return => "Customer return",
            EntryType::Adjustment => "Stock adjustment",
            EntryType::Initial => "Initial stock",
        }
    }

    /// Only adjustments may carry negative quantities.
    pub fn allows_negative_quantities(&self) -> bool {
        matches!(self, EntryType::Adjustment)
    }
}

impl core::fmt::Display for EntryType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown entry type '{s}'")))
    }
}
