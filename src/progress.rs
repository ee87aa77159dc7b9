//! Progress indicators for reconciliation passes.

use indicatif::{ProgressBar, ProgressStyle};
use reconcile::{KeyReport, ProgressCallback, Tier};

use crate::ui;

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

/// Create a spinner for work without a known length
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// One progress bar per tier; key outcomes are printed above the bar
pub struct PassProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl PassProgress {
    pub fn new(quiet: bool) -> Self {
        Self { bar: None, quiet }
    }
}

impl ProgressCallback for PassProgress {
    fn on_tier_start(&mut self, tier: Tier, count: usize) {
        if self.quiet {
            return;
        }
        ui::section(&format!("{} ({count})", capitalize(tier.label())));
        let pb = ProgressBar::new(count as u64);
        pb.set_style(bar_style());
        pb.set_message(tier.label());
        self.bar = Some(pb);
    }

    fn on_key_complete(&mut self, report: &KeyReport) {
        match &self.bar {
            Some(pb) => {
                pb.suspend(|| ui::key_report(report));
                pb.inc(1);
            }
            None if !self.quiet || report.outcome.is_failure() => ui::key_report(report),
            None => {}
        }
    }

    fn on_tier_complete(&mut self, _tier: Tier) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
