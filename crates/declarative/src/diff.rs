//! Planned actions and diff summaries

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One attribute whose value will change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// Attribute name as the operator writes it
    pub attribute: String,
    /// Current value, rendered; `None` when unset
    pub from: Option<String>,
    /// Desired value, rendered; `None` when it will be cleared
    pub to: Option<String>,
}

impl AttributeChange {
    pub fn new(attribute: impl Into<String>, from: Option<String>, to: Option<String>) -> Self {
        Self {
            attribute: attribute.into(),
            from,
            to,
        }
    }
}

/// What a reconciliation pass will do to one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Resource does not exist and will be created
    Create,
    /// Resource exists; the listed attributes will be upserted
    Update { changes: Vec<AttributeChange> },
    /// Resource exists and will be removed
    Delete,
}

/// A planned change for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDiff {
    /// Kind of the resource, e.g. "handler"
    pub kind: String,
    /// Identity of the resource within its kind
    pub id: String,
    /// What will happen
    pub action: Action,
}

impl ResourceDiff {
    pub fn new(kind: impl Into<String>, id: impl Into<String>, action: Action) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            action,
        }
    }

    /// Check if this diff represents an addition
    pub fn is_addition(&self) -> bool {
        matches!(self.action, Action::Create)
    }

    /// Check if this diff represents a removal
    pub fn is_removal(&self) -> bool {
        matches!(self.action, Action::Delete)
    }

    /// Check if this diff represents a modification
    pub fn is_modification(&self) -> bool {
        matches!(self.action, Action::Update { .. })
    }

    /// Human-readable description
    pub fn description(&self) -> String {
        match &self.action {
            Action::Create => format!("Create {} {}", self.kind, self.id),
            Action::Update { changes } => format!(
                "Update {} {} ({} attribute{})",
                self.kind,
                self.id,
                changes.len(),
                if changes.len() == 1 { "" } else { "s" }
            ),
            Action::Delete => format!("Delete {} {}", self.kind, self.id),
        }
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    /// Number of resources to add
    pub additions: usize,
    /// Number of resources to remove
    pub removals: usize,
    /// Number of resources to modify
    pub modifications: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs<'a>(diffs: impl IntoIterator<Item = &'a ResourceDiff>) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.action {
                Action::Create => summary.additions += 1,
                Action::Delete => summary.removals += 1,
                Action::Update { .. } => summary.modifications += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by resource kind
pub fn group_by_kind(diffs: &[ResourceDiff]) -> BTreeMap<&str, Vec<&ResourceDiff>> {
    let mut groups: BTreeMap<&str, Vec<&ResourceDiff>> = BTreeMap::new();
    for diff in diffs {
        groups.entry(diff.kind.as_str()).or_default().push(diff);
    }
    groups
}
