//! Declarative commands
//!
//! - `status` - Show discovered objects against the configuration
//! - `apply` - Make Sensu match the configuration
//! - `diff` - Preview what apply would change
//! - `validate` - Check the configuration offline

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use declarative::{ExecuteOptions, Reconcile, Target};
use sensuctl::Client;

use crate::Context;
use crate::config::Desired;
use crate::engine;
use crate::paths;
use crate::resource::handler::{self, HandlerPass};
use crate::resource::license::{self, LicensePass};
use crate::resource::{Identity, ReconcileError};
use crate::ui;

const KINDS: [&str; 2] = [handler::KIND, license::KIND];

// ============================================================================
// Loading
// ============================================================================

fn load_desired(ctx: &Context) -> Result<Desired> {
    let path = paths::config_file(ctx.config.as_deref())?;
    Desired::load(&path)
}

fn parse_target(target: Option<&str>) -> Result<Option<Target>> {
    let Some(raw) = target else {
        return Ok(None);
    };
    let target = Target::parse(raw);
    if !KINDS.iter().any(|k| target.matches_kind(k)) {
        bail!(
            "Unknown target kind '{}' (expected one of: {})",
            target.kind,
            KINDS.join(", ")
        );
    }
    Ok(Some(target))
}

fn selected(target: Option<&Target>, kind: &str) -> bool {
    target.is_none_or(|t| t.matches_kind(kind))
}

fn report_discovery_error(err: ReconcileError) {
    let advice = err.advice();
    ui::error(&format!("{:#}", anyhow::Error::from(err)));
    if let Some(advice) = advice {
        ui::dim(advice);
    }
}

/// Discover every selected kind, one list call each.
///
/// A kind whose discovery fails is reported and left out; the count of
/// such kinds is returned alongside the passes.
fn discover<'a>(
    client: &'a Client,
    desired: &Desired,
    target: Option<&Target>,
) -> (Vec<Box<dyn Reconcile + 'a>>, usize) {
    let mut passes: Vec<Box<dyn Reconcile + 'a>> = Vec::new();
    let mut failed_kinds = 0;

    if selected(target, handler::KIND) {
        match HandlerPass::prefetch(client, desired.handlers.clone(), desired.purge.handlers) {
            Ok(pass) => passes.push(Box::new(pass)),
            Err(e) => {
                report_discovery_error(e);
                failed_kinds += 1;
            }
        }
    }

    if selected(target, license::KIND) && !desired.licenses.is_empty() {
        passes.push(Box::new(LicensePass::prefetch(
            client,
            desired.licenses.clone(),
        )));
    }

    (passes, failed_kinds)
}

// ============================================================================
// Apply / Diff
// ============================================================================

pub fn apply(ctx: &Context, target: Option<&str>, dry_run: bool, yes: bool) -> Result<()> {
    let target = parse_target(target)?;
    let desired = load_desired(ctx)?;
    let client = desired.sensuctl.client()?;

    if !ctx.quiet {
        ui::header("Sensu Apply");
    }

    let (mut passes, failed_kinds) = discover(&client, &desired, target.as_ref());
    let plans = declarative::plan(&passes, target.as_ref());

    let opts = ExecuteOptions {
        dry_run,
        yes,
        verbose: ctx.verbose > 0,
    };
    let summary = engine::execute(&mut passes, &plans, &opts).context("Apply failed")?;

    if failed_kinds > 0 {
        bail!("discovery failed for {}", ui::plural(failed_kinds, "kind"));
    }
    if !summary.is_success() {
        bail!("{} could not be applied", ui::plural(summary.failed, "resource"));
    }
    Ok(())
}

pub fn diff(ctx: &Context, target: Option<&str>) -> Result<()> {
    let target = parse_target(target)?;
    let desired = load_desired(ctx)?;
    let client = desired.sensuctl.client()?;

    if !ctx.quiet {
        ui::header("Sensu Diff");
    }

    let (passes, failed_kinds) = discover(&client, &desired, target.as_ref());
    let plans = declarative::plan(&passes, target.as_ref());
    engine::display_diff(&plans);

    if failed_kinds > 0 {
        bail!("discovery failed for {}", ui::plural(failed_kinds, "kind"));
    }
    Ok(())
}

// ============================================================================
// Status
// ============================================================================

pub fn status(ctx: &Context, target: Option<&str>) -> Result<()> {
    let target = parse_target(target)?;
    let desired = load_desired(ctx)?;
    let client = desired.sensuctl.client()?;

    ui::header("Sensu Status");
    let mut failed_kinds = 0;

    if selected(target.as_ref(), handler::KIND) {
        match HandlerPass::prefetch(&client, desired.handlers.clone(), false) {
            Ok(pass) => show_handlers(&pass, &desired, target.as_ref()),
            Err(e) => {
                report_discovery_error(e);
                failed_kinds += 1;
            }
        }
    }

    if selected(target.as_ref(), license::KIND) {
        ui::section(ui::kind_title(license::KIND));
        let active = license::is_active(&client);
        ui::kv("active", if active { "yes" } else { "no" });
        for declared in &desired.licenses {
            ui::kv("declared", &format!("{} ({})", declared.file.display(), declared.ensure));
        }
    }

    if failed_kinds > 0 {
        bail!("discovery failed for {}", ui::plural(failed_kinds, "kind"));
    }
    Ok(())
}

fn name_matches(target: Option<&Target>, identity: &Identity) -> bool {
    target
        .and_then(|t| t.name.as_deref())
        .is_none_or(|name| identity.to_string().contains(name))
}

fn show_handlers(pass: &HandlerPass<'_>, desired: &Desired, target: Option<&Target>) {
    ui::section(ui::kind_title(handler::KIND));

    let mut shown = 0;
    for instance in pass.instances() {
        if !name_matches(target, &instance.identity) {
            continue;
        }
        shown += 1;
        let kind = instance
            .state
            .handler_type
            .map_or_else(|| "?".to_string(), |t| t.to_string());
        if pass.is_declared(&instance.identity) {
            println!("  {} {:<30} {}", "✓".green(), instance.identity, kind.dimmed());
        } else {
            println!(
                "  {} {:<30} {} {}",
                "○".dimmed(),
                instance.identity,
                kind.dimmed(),
                "(not declared)".dimmed()
            );
        }
    }

    for declared in desired.handlers.iter().filter(|h| !pass.exists(&h.identity)) {
        if !name_matches(target, &declared.identity) {
            continue;
        }
        shown += 1;
        println!("  {} {:<30} {}", "✗".red(), declared.identity, "(missing)".red());
    }

    if shown == 0 {
        ui::dim("No handlers");
    }
}

// ============================================================================
// Validate
// ============================================================================

pub fn validate(ctx: &Context) -> Result<()> {
    let path = paths::config_file(ctx.config.as_deref())?;
    let desired = Desired::load(&path)?;

    if desired.resource_count() == 0 {
        ui::warn(&format!("{} declares no resources", path.display()));
        return Ok(());
    }

    ui::success(&format!(
        "{} is valid: {}, {}",
        path.display(),
        ui::plural(desired.handlers.len(), "handler"),
        ui::plural(desired.licenses.len(), "license")
    ));
    if desired.purge.handlers && !ctx.quiet {
        ui::info("Undeclared handlers will be deleted on apply");
    }
    Ok(())
}
