use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use reconcile::{ExecuteOptions, ReconcileContext, ResourceKind, StatusEntry};

use super::{Workspace, as_remote};
use crate::Context;
use crate::cli::PassArgs;
use crate::{progress, ui};

/// Read-only drift report; never changes the remote or the state file
pub fn run(ctx: &Context, args: &PassArgs) -> Result<()> {
    let ws = Workspace::load(ctx)?;
    let set = ws.declarations()?;

    let client = ws.client(ctx, args.timeout)?;
    let engine = ReconcileContext::new(as_remote(client.as_ref()), ws.namespace.clone());
    let options = ExecuteOptions {
        jobs: ws.config.jobs(args.jobs),
    };

    let spinner = (!ctx.quiet && !ctx.json).then(|| progress::spinner("Checking remote state..."));
    let entries = reconcile::status(&set, &ws.state, &engine, &options)?;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    if ctx.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("Failed to serialize status")?
        );
        return Ok(());
    }

    ui::header(&format!("Status of {}", ws.config.path.display()));
    if !engine.has_credentials() {
        ui::warn("No API key configured - remote state is unknown");
    }

    print_group(&entries, "Queries", ResourceKind::Query);
    print_group(&entries, "Materialized views", ResourceKind::MaterializedView);

    let in_sync = entries
        .iter()
        .filter(|e| matches!(&e.check, Ok(v) if v.is_match()))
        .count();
    println!();
    println!(
        "{} {}/{} in sync",
        "Summary:".bold(),
        in_sync,
        entries.len()
    );
    Ok(())
}

fn print_group(entries: &[StatusEntry], title: &str, kind: ResourceKind) {
    let group: Vec<_> = entries.iter().filter(|e| e.kind == kind).collect();
    if group.is_empty() {
        return;
    }
    ui::section(title);
    for entry in group {
        let verdict = match &entry.check {
            Ok(verdict) => ui::verdict(verdict),
            Err(cause) => format!("{} {}", "✗".red(), cause.red()),
        };
        match &entry.remote_id {
            Some(id) => ui::kv(&entry.key, &format!("{verdict} {}", format!("({id})").dimmed())),
            None => ui::kv(&entry.key, &verdict),
        }
    }
}
