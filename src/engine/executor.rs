//! Execution engine - terminal UI around the declarative executor

use anyhow::Result;
use colored::Colorize;
use declarative::{
    ApplyResult, ConfirmCallback, ExecuteOptions, ExecuteSummary, PassPlan, ProgressCallback,
    Reconcile,
};

use super::differ::display_diff;
use crate::ui;

/// Prompts on the terminal and remembers a refusal
#[derive(Debug, Default)]
pub struct DialoguerConfirm {
    pub declined: bool,
}

impl ConfirmCallback for DialoguerConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        use dialoguer::Confirm;

        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;

        self.declined = !confirmed;
        Ok(confirmed)
    }
}

/// Prints one line per applied resource
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    pub verbose: bool,
}

impl ProgressCallback for ConsoleProgress {
    fn on_pass_start(&mut self, kind: &str, count: usize) {
        println!();
        println!(
            "  {} Applying {}...",
            "→".cyan(),
            ui::plural(count, kind)
        );
    }

    fn on_resource_start(&mut self, _id: &str, description: &str) {
        if self.verbose {
            ui::dim(description);
        }
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        let symbol = ui::result_symbol(result);
        match result {
            ApplyResult::Failed { error } => {
                log::warn!("{id} failed: {error}");
                println!("    {} {}", symbol.red(), id);
                println!("      {}", error.red());
            }
            ApplyResult::Skipped { reason } => {
                println!("    {} {} {}", symbol.dimmed(), id, format!("({reason})").dimmed());
            }
            _ => println!("    {} {}", symbol.green(), id),
        }
    }

    fn on_pass_complete(&mut self, kind: &str) {
        log::debug!("Finished {kind} pass");
    }
}

/// Show the diff, confirm, and apply every pass in order
pub fn execute(
    passes: &mut [Box<dyn Reconcile + '_>],
    plans: &[PassPlan],
    opts: &ExecuteOptions,
) -> Result<ExecuteSummary> {
    display_diff(plans);

    if plans.iter().all(|p| p.diffs.is_empty()) {
        return Ok(ExecuteSummary::default());
    }

    if opts.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return Ok(ExecuteSummary::default());
    }

    let mut progress = ConsoleProgress {
        verbose: opts.verbose,
    };
    let mut confirm = DialoguerConfirm::default();
    let summary = declarative::execute(passes, plans, opts, &mut progress, &mut confirm)?;

    if confirm.declined {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(summary);
    }

    print_summary(&summary);
    Ok(summary)
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!(
            "  {} Configuration applied successfully!",
            "✓".green().bold()
        );
    } else {
        println!(
            "  {} Configuration applied with errors",
            "⚠".yellow().bold()
        );
    }

    for line in summary_lines(summary) {
        println!("    • {line}");
    }
}

fn summary_lines(summary: &ExecuteSummary) -> Vec<String> {
    [
        (summary.created, "created"),
        (summary.modified, "modified"),
        (summary.removed, "removed"),
        (summary.skipped, "skipped"),
        (summary.failed, "failed"),
    ]
    .into_iter()
    .filter(|(count, _)| *count > 0)
    .map(|(count, verb)| format!("{} {verb}", ui::plural(count, "resource")))
    .collect()
}
