//! Diff display

use crate::ui;
use colored::Colorize;
use declarative::{Action, AttributeChange, DiffSummary, PassPlan};

/// Display planned changes grouped by kind
pub fn display_diff(plans: &[PassPlan]) {
    let summary = DiffSummary::from_diffs(plans.iter().flat_map(|p| &p.diffs));
    if !summary.has_changes() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Configuration Diff".bold()
    );
    println!("│");

    for plan in plans.iter().filter(|p| !p.diffs.is_empty()) {
        println!("│ {}", ui::kind_title(plan.kind).bold());

        for diff in &plan.diffs {
            match &diff.action {
                Action::Create => {
                    println!("│   {} {:<30} {}", "+".green(), diff.id, "(will create)".dimmed());
                }
                Action::Delete => {
                    println!("│   {} {:<30} {}", "-".red(), diff.id, "(will remove)".dimmed());
                }
                Action::Update { changes } => {
                    println!("│   {} {}", "~".yellow(), diff.id);
                    for change in changes {
                        println!("│       {}", describe_change(change).dimmed());
                    }
                }
            }
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} to create, {} to update, {} to remove)",
        summary.total().to_string().bold(),
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.removals.to_string().red()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// One attribute change as `name: old → new`
pub fn describe_change(change: &AttributeChange) -> String {
    format!(
        "{}: {} → {}",
        change.attribute,
        change.from.as_deref().unwrap_or("(unset)"),
        change.to.as_deref().unwrap_or("(absent)")
    )
}
