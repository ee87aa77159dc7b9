use anyhow::Result;
use reconcile::{ExecuteOptions, ReconcileContext, execute};

use super::{Workspace, as_remote, finish, plan};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::progress::PassProgress;
use crate::ui;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let mut ws = Workspace::load(ctx)?;
    let set = ws.declarations()?;

    if args.dry_run {
        plan::show(ctx, &ws, &set)?;
        if !ctx.quiet && !ctx.json {
            println!();
            ui::info("Dry run - no changes made");
        }
        return Ok(());
    }

    let client = ws.client(ctx, args.pass.timeout)?;
    let engine = ReconcileContext::new(as_remote(client.as_ref()), ws.namespace.clone());
    let options = ExecuteOptions {
        jobs: ws.config.jobs(args.pass.jobs),
    };

    if !ctx.quiet && !ctx.json {
        ui::header(&format!("Applying {}", ws.config.path.display()));
        if ctx.verbose > 0 {
            ui::kv("state", &ws.state_path.display().to_string());
            ui::kv("jobs", &options.jobs.to_string());
            ui::kv("records", &ws.state.len().to_string());
        }
        if !engine.has_credentials() {
            ui::warn("No API key configured - every key will be skipped");
        }
    }

    let mut progress = PassProgress::new(ctx.quiet || ctx.json);
    let report = execute(&set, &mut ws.state, &engine, &options, &mut progress)?;

    if engine.has_credentials() {
        ws.state.persist(&ws.state_path)?;
    }

    finish(ctx, &report)
}
