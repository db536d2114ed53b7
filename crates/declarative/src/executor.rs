//! Execution engine - applies planned changes sequentially

use crate::context::{ConfirmCallback, ProgressCallback};
use crate::diff::DiffSummary;
use crate::planner::PassPlan;
use crate::reconcile::Reconcile;
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary};
use anyhow::{Result, bail};

/// Execute planned changes with the given options and callbacks
///
/// `plans` must come from [`plan`](crate::planner::plan) over the same
/// `passes`. Every kind is applied in order, one resource at a time. A
/// failing resource is recorded and the pass continues.
///
/// # Returns
/// Summary of execution results
pub fn execute<P, C>(
    passes: &mut [Box<dyn Reconcile + '_>],
    plans: &[PassPlan],
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteSummary>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    if passes.len() != plans.len() {
        bail!(
            "plan covers {} kinds but {} passes were given",
            plans.len(),
            passes.len()
        );
    }

    let total_changes = DiffSummary::from_diffs(plans.iter().flat_map(|p| &p.diffs)).total();

    if total_changes == 0 {
        return Ok(ExecuteSummary::default());
    }

    if opts.dry_run {
        return Ok(ExecuteSummary::default());
    }

    // Confirm before proceeding (unless --yes)
    if !opts.yes && !confirm.confirm("Apply changes?")? {
        return Ok(ExecuteSummary {
            skipped: total_changes,
            ..Default::default()
        });
    }

    let mut summary = ExecuteSummary::default();

    for (pass, plan) in passes.iter_mut().zip(plans) {
        if plan.diffs.is_empty() {
            continue;
        }

        progress.on_pass_start(plan.kind, plan.diffs.len());
        for diff in &plan.diffs {
            progress.on_resource_start(&diff.id, &diff.description());
            let result = match pass.apply(diff) {
                Ok(result) => result,
                Err(e) => ApplyResult::Failed {
                    error: format!("{e:#}"),
                },
            };
            progress.on_resource_complete(&diff.id, &result);
            summary.add_result(&result);
        }
        progress.on_pass_complete(plan.kind);
    }

    Ok(summary)
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple(
    passes: &mut [Box<dyn Reconcile + '_>],
    plans: &[PassPlan],
    opts: &ExecuteOptions,
) -> Result<ExecuteSummary> {
    use crate::context::{AutoConfirm, NoProgress};

    execute(passes, plans, opts, &mut NoProgress, &mut AutoConfirm)
}
