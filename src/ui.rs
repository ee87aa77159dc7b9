use colored::Colorize;
use reconcile::{DriftVerdict, KeyReport, Outcome, PassSummary, PlannedAction};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Reconciliation output
// ============================================================================

/// One line per key outcome
pub fn key_report(report: &KeyReport) {
    let label = format!("{} {}", report.kind, report.key.bold());
    match &report.outcome {
        Outcome::Converged {
            remote_id,
            mode,
            note,
        } => {
            let mode = mode.map(|m| format!(" ({m})")).unwrap_or_default();
            success(&format!("{label} -> {remote_id}{mode}"));
            if let Some(note) = note {
                dim(note);
            }
        }
        Outcome::Drifted { remote_id, reasons } => {
            let reasons: Vec<String> = reasons.iter().map(ToString::to_string).collect();
            warn(&format!("{label} -> {remote_id} drifted: {}", reasons.join(", ")));
        }
        Outcome::Missing => warn(&format!("{label} missing on remote after apply")),
        Outcome::Skipped { reason } => {
            println!("{} {} {}", "-".dimmed(), label, format!("skipped: {reason}").dimmed());
        }
        Outcome::Failed { cause } => error(&format!("{label} failed: {cause}")),
        Outcome::Removed { terminal } => {
            println!("{} {} {}", "−".red(), label, terminal.to_string().dimmed());
        }
    }
}

/// Summary line at the end of a pass
pub fn summary(summary: &PassSummary) {
    let mut parts = vec![format!("{} converged", summary.converged).green().to_string()];
    if summary.removed > 0 {
        parts.push(format!("{} removed", summary.removed));
    }
    if summary.drifted > 0 {
        parts.push(format!("{} drifted", summary.drifted).yellow().to_string());
    }
    if summary.missing > 0 {
        parts.push(format!("{} missing", summary.missing).yellow().to_string());
    }
    if summary.skipped > 0 {
        parts.push(format!("{} skipped", summary.skipped).dimmed().to_string());
    }
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed).red().to_string());
    }
    println!();
    println!("{} {}", "Summary:".bold(), parts.join(", "));
}

/// Colored symbol and text for a drift verdict
pub fn verdict(verdict: &DriftVerdict) -> String {
    match verdict {
        DriftVerdict::Match => format!("{} {}", "✓".green(), "in sync".green()),
        DriftVerdict::Drift { .. } => format!("{} {}", "⚠".yellow(), verdict.to_string().yellow()),
        DriftVerdict::Missing => format!("{} {}", "✗".red(), "missing".red()),
        DriftVerdict::Unknown => format!("{} {}", "?".dimmed(), "unknown".dimmed()),
    }
}

/// Short description of a planned action
pub fn action(action: &PlannedAction) -> String {
    match action {
        PlannedAction::Adopt => format!("{} search by name, create if absent", "+".green()),
        PlannedAction::Refresh { remote_id } => format!("{} update {remote_id}", "~".yellow()),
        PlannedAction::Upsert { full_name } => format!("{} upsert {full_name}", "~".yellow()),
        PlannedAction::Remove { remote_id } => format!("{} remove {remote_id}", "−".red()),
    }
}
