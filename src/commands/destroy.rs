use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use dialoguer::Confirm;
use reconcile::{ExecuteOptions, ReconcileContext, ResourceKind, StateStore, destroy_all};

use super::{Workspace, as_remote, finish};
use crate::Context;
use crate::cli::DestroyArgs;
use crate::progress::PassProgress;
use crate::ui;

pub fn run(ctx: &Context, args: &DestroyArgs) -> Result<()> {
    let mut ws = Workspace::load(ctx)?;

    if ws.state.is_empty() {
        if !ctx.quiet {
            ui::info("Nothing to destroy - the state file has no records");
        }
        return Ok(());
    }

    let client = ws.client(ctx, args.pass.timeout)?;
    let engine = ReconcileContext::new(as_remote(client.as_ref()), ws.namespace.clone());
    if !engine.has_credentials() {
        bail!("An API key is required to destroy remote resources");
    }

    if !ctx.json {
        ui::header("Resources to remove");
        for record in ws.state.records() {
            let verb = match record.kind {
                ResourceKind::Query => "archive",
                ResourceKind::MaterializedView => "delete",
            };
            ui::kv(&record.key, &format!("{} {}", verb.red(), record.remote_id));
        }
        println!();
    }

    if !args.yes && !confirm_destroy(ws.state.len())? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    let options = ExecuteOptions {
        jobs: ws.config.jobs(args.pass.jobs),
    };
    let mut progress = PassProgress::new(ctx.quiet || ctx.json);
    let report = destroy_all(&mut ws.state, &engine, &options, &mut progress)?;
    ws.state.persist(&ws.state_path)?;

    finish(ctx, &report)
}

/// Confirm with user
fn confirm_destroy(count: usize) -> Result<bool> {
    let confirmed = Confirm::new()
        .with_prompt(format!("Remove {count} managed resources?"))
        .default(false)
        .interact()
        .context("Confirmation prompt failed (use --yes when not on a terminal)")?;

    Ok(confirmed)
}
