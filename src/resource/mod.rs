//! Managed Sensu object kinds
//!
//! Each kind has a raw configuration shape (what the operator writes), a
//! validated desired form, and a pass that reconciles it against sensuctl.

pub mod field;
pub mod handler;
pub mod license;

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

pub use field::Field;

/// Identity of a namespaced Sensu object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity {
    pub name: String,
    pub namespace: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Split a title of the form `"<name> in <namespace>"`.
    ///
    /// Returns the whole title as the name when it has no namespace part.
    pub fn parse_title(title: &str) -> (String, Option<String>) {
        match title.split_once(" in ") {
            Some((name, namespace)) if !name.is_empty() && !namespace.trim().is_empty() => {
                (name.to_string(), Some(namespace.trim().to_string()))
            }
            _ => (title.to_string(), None),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.name, self.namespace)
    }
}

/// Whether a declared resource should exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

impl fmt::Display for Ensure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

/// Reconciliation failures, one variant per stage
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Desired attributes are missing, malformed or conflicting
    #[error("{resource}: {message}")]
    Validation { resource: String, message: String },

    /// Listing existing objects failed; the kind is not reconciled
    #[error("failed to discover {kind} objects")]
    Discovery {
        kind: &'static str,
        #[source]
        source: sensuctl::Error,
    },

    /// A create, upsert or delete failed for one resource
    #[error("failed to {action} {resource}")]
    Apply {
        resource: String,
        action: &'static str,
        #[source]
        source: sensuctl::Error,
    },
}

impl ReconcileError {
    pub fn validation(resource: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    /// Operator advice for tool failures, if any
    pub fn advice(&self) -> Option<&'static str> {
        match self {
            Self::Validation { .. } => None,
            Self::Discovery { source, .. } | Self::Apply { source, .. } => {
                Some(source.category().advice())
            }
        }
    }
}
