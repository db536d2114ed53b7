//! Planning - collect the diffs of every pass, filtered by target

use crate::diff::ResourceDiff;
use crate::reconcile::Reconcile;

/// The planned diffs of one reconciliation pass
#[derive(Debug, Clone)]
pub struct PassPlan {
    /// Kind handled by the pass
    pub kind: &'static str,
    /// Changes to apply, in order
    pub diffs: Vec<ResourceDiff>,
}

/// Selects a subset of resources: `kind` or `kind.name`
///
/// The name part matches by substring, so `handler.slack` selects
/// `slack in default` and `slack-ops in ops`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub kind: String,
    pub name: Option<String>,
}

impl Target {
    /// Parse a target string like "kind.name" into a target
    pub fn parse(target: &str) -> Self {
        match target.split_once('.') {
            Some((kind, name)) => Self {
                kind: kind.to_string(),
                name: Some(name.to_string()),
            },
            None => Self {
                kind: target.to_string(),
                name: None,
            },
        }
    }

    /// Check if a kind is selected at all (plural forms allowed)
    pub fn matches_kind(&self, kind: &str) -> bool {
        self.kind.trim_end_matches('s') == kind.trim_end_matches('s')
    }

    /// Check if a diff matches the filter criteria
    pub fn matches(&self, diff: &ResourceDiff) -> bool {
        if !self.matches_kind(&diff.kind) {
            return false;
        }

        if let Some(n) = &self.name
            && !diff.id.contains(n.as_str())
        {
            return false;
        }

        true
    }
}

/// Collect diffs from every pass
///
/// Returns one plan per pass, in the same order, so plans can be
/// zipped back onto their passes for execution.
pub fn plan(passes: &[Box<dyn Reconcile + '_>], target: Option<&Target>) -> Vec<PassPlan> {
    passes
        .iter()
        .map(|pass| PassPlan {
            kind: pass.kind(),
            diffs: pass
                .plan()
                .into_iter()
                .filter(|d| target.is_none_or(|t| t.matches(d)))
                .collect(),
        })
        .collect()
}
