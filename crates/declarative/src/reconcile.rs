//! Reconcile trait - one pass over one resource kind
//!
//! A pass is built after discovery: it already holds the actual state
//! reported by the external system and the desired resources for its kind.
//! Planning is then a pure comparison, and applying executes one planned
//! action at a time.

use crate::diff::ResourceDiff;
use crate::types::ApplyResult;
use anyhow::Result;

/// A reconciliation pass for a single resource kind
///
/// # Example
///
/// ```ignore
/// use declarative::{Action, ApplyResult, Reconcile, ResourceDiff};
///
/// struct Files { desired: Vec<String>, present: Vec<String> }
///
/// impl Reconcile for Files {
///     fn kind(&self) -> &'static str { "file" }
///
///     fn plan(&self) -> Vec<ResourceDiff> {
///         self.desired
///             .iter()
///             .filter(|f| !self.present.contains(f))
///             .map(|f| ResourceDiff::new("file", f.as_str(), Action::Create))
///             .collect()
///     }
///
///     fn apply(&mut self, diff: &ResourceDiff) -> anyhow::Result<ApplyResult> {
///         std::fs::write(&diff.id, "")?;
///         self.present.push(diff.id.clone());
///         Ok(ApplyResult::Created)
///     }
/// }
/// ```
pub trait Reconcile {
    /// Resource kind handled by this pass (e.g. "handler")
    fn kind(&self) -> &'static str;

    /// Compare desired and discovered state
    ///
    /// Returns only resources that need a change.
    fn plan(&self) -> Vec<ResourceDiff>;

    /// Apply one planned change
    ///
    /// An error fails this resource only; the executor moves on.
    fn apply(&mut self, diff: &ResourceDiff) -> Result<ApplyResult>;
}
