use anyhow::{Context as AnyhowContext, Result};
use reconcile::{DeclarationSet, Plan, PlanEntry, PlannedAction, ResourceKind};

use super::Workspace;
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let ws = Workspace::load(ctx)?;
    let set = ws.declarations()?;
    show(ctx, &ws, &set)
}

/// Print the actions the next apply would take; makes no remote calls
pub fn show(ctx: &Context, ws: &Workspace, set: &DeclarationSet) -> Result<()> {
    let plan = reconcile::plan(set, &ws.state, &ws.namespace)?;

    if ctx.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?
        );
        return Ok(());
    }

    ui::header(&format!("Plan for {}", ws.config.path.display()));
    if plan.is_empty() {
        ui::info("Nothing declared and nothing to remove");
        return Ok(());
    }

    print_group(&plan, "Queries", |e| {
        e.kind == ResourceKind::Query && !is_removal(e)
    });
    print_group(&plan, "Materialized views", |e| {
        e.kind == ResourceKind::MaterializedView && !is_removal(e)
    });
    print_group(&plan, "Removals", |e| is_removal(e));

    Ok(())
}

fn is_removal(entry: &PlanEntry) -> bool {
    matches!(entry.action, PlannedAction::Remove { .. })
}

fn print_group(plan: &Plan, title: &str, filter: impl Fn(&&PlanEntry) -> bool) {
    let entries: Vec<_> = plan.entries.iter().filter(filter).collect();
    if entries.is_empty() {
        return;
    }
    ui::section(title);
    for entry in entries {
        ui::kv(&entry.key, &ui::action(&entry.action));
    }
}
