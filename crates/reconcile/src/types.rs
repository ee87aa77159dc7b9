//! Core types for declared resources and reconciliation outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

/// Who can see a query on the remote side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl Visibility {
    pub fn is_private(self) -> bool {
        matches!(self, Self::Private)
    }

    pub fn from_private_flag(is_private: bool) -> Self {
        if is_private { Self::Private } else { Self::Public }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private => write!(f, "private"),
            Self::Public => write!(f, "public"),
        }
    }
}

/// Compute tier used to refresh a materialized view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTier {
    #[default]
    Medium,
    Large,
}

impl PerformanceTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl fmt::Display for PerformanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a remote id carries an actual identity.
///
/// Empty strings and `"0"` are placeholders left behind by unresolved
/// resources and never refer to a remote object.
pub fn is_meaningful_id(id: &str) -> bool {
    let id = id.trim();
    !id.is_empty() && id != "0"
}

/// A declared analytical query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDeclaration {
    /// Unique key within the declaration set
    pub key: String,
    /// Name shown on the remote side, also used for name search
    pub display_name: String,
    /// Query text
    pub content: String,
    pub visibility: Visibility,
    /// Remote id known from a previous pass or pinned in configuration
    pub remembered_remote_id: Option<String>,
}

impl QueryDeclaration {
    pub fn new(
        key: impl Into<String>,
        display_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            content: content.into(),
            visibility: Visibility::default(),
            remembered_remote_id: None,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_remembered_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remembered_remote_id = Some(remote_id.into());
        self
    }

    /// The remembered id, if it is usable
    pub fn remembered_id(&self) -> Option<&str> {
        self.remembered_remote_id
            .as_deref()
            .map(str::trim)
            .filter(|id| is_meaningful_id(id))
    }

    /// Reject declarations the remote side could never accept
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.display_name.trim().is_empty() {
            return Err(ConfigError::EmptyField {
                key: self.key.clone(),
                field: "display_name",
            });
        }
        if self.content.trim().is_empty() {
            return Err(ConfigError::EmptyField {
                key: self.key.clone(),
                field: "content",
            });
        }
        Ok(())
    }
}

/// A declared materialized view derived from a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDeclaration {
    /// Unique key within the declaration set, also the view's short name
    pub key: String,
    /// Key of the query this view materializes
    pub source_query_key: String,
    /// Five-field cron expression
    pub refresh_schedule: String,
    pub performance_tier: PerformanceTier,
}

impl ViewDeclaration {
    pub fn new(
        key: impl Into<String>,
        source_query_key: impl Into<String>,
        refresh_schedule: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            source_query_key: source_query_key.into(),
            refresh_schedule: refresh_schedule.into(),
            performance_tier: PerformanceTier::default(),
        }
    }

    pub fn with_tier(mut self, tier: PerformanceTier) -> Self {
        self.performance_tier = tier;
        self
    }
}

/// Pass-wide naming scope for materialized views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub namespace: String,
    pub team: String,
}

impl Namespace {
    pub fn new(namespace: impl Into<String>, team: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            team: team.into(),
        }
    }

    /// `{namespace}.{team}.{key}`
    pub fn full_name(&self, key: &str) -> String {
        format!("{}.{}.{}", self.namespace, self.team, key)
    }
}

/// How the identity resolver settled on a remote id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
    /// Remembered id still exists remotely
    Reused,
    /// Adopted an existing remote query by exact name
    Found,
    /// Created a new remote query
    Created,
}

impl fmt::Display for ResolveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reused => write!(f, "reused"),
            Self::Found => write!(f, "found"),
            Self::Created => write!(f, "created"),
        }
    }
}

/// Output of the identity resolver, input of the upsert engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub remote_id: String,
    pub mode: ResolveMode,
    /// Remote object is still archived and must be unarchived before update
    pub archived: bool,
    /// Visibility observed on the remote object
    pub visibility: Visibility,
    /// Non-fatal remark, e.g. a tolerated name collision
    pub note: Option<String>,
}

/// A query converged in the current pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedResource {
    pub key: String,
    pub remote_id: String,
    pub content_fingerprint: String,
    /// Name under which other queries can reference this one
    pub full_qualified_name: String,
    pub mode: ResolveMode,
    pub visibility: Visibility,
}

impl ResolvedResource {
    /// Reference name of a query result table
    pub fn query_reference(remote_id: &str) -> String {
        format!("query_{remote_id}")
    }
}

/// Why a materialized view is considered drifted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftReason {
    ScheduleMissing,
    ScheduleMismatch,
    LinkedResourceMismatch,
}

impl fmt::Display for DriftReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScheduleMissing => write!(f, "schedule_missing"),
            Self::ScheduleMismatch => write!(f, "schedule_mismatch"),
            Self::LinkedResourceMismatch => write!(f, "linked_resource_mismatch"),
        }
    }
}

/// Relationship between declared and observed remote state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriftVerdict {
    Match,
    Drift { reasons: BTreeSet<DriftReason> },
    Missing,
    /// The check could not run (no credentials)
    Unknown,
}

impl DriftVerdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for DriftVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => write!(f, "match"),
            Self::Drift { reasons } => {
                let reasons: Vec<String> = reasons.iter().map(ToString::to_string).collect();
                write!(f, "drift ({})", reasons.join(", "))
            }
            Self::Missing => write!(f, "missing"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Fresh snapshot of a remote object, never cached across passes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteObservation {
    pub exists: bool,
    /// Id of the linked source object, when the remote exposes it
    pub source_id: Option<String>,
    /// Refresh schedule, when the remote exposes it
    pub schedule: Option<String>,
}

impl RemoteObservation {
    pub fn missing() -> Self {
        Self::default()
    }
}

/// Kind of a managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Query,
    MaterializedView,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::MaterializedView => write!(f, "materialized_view"),
        }
    }
}

/// Last-applied state of one managed resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub key: String,
    pub kind: ResourceKind,
    /// Query id, or the full qualified name of a materialized view
    pub remote_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    pub fn query(resolved: &ResolvedResource) -> Self {
        Self {
            key: resolved.key.clone(),
            kind: ResourceKind::Query,
            remote_id: resolved.remote_id.clone(),
            fingerprint: Some(resolved.content_fingerprint.clone()),
            source_key: None,
            updated_at: Utc::now(),
        }
    }

    pub fn view(view: &ViewDeclaration, full_name: impl Into<String>) -> Self {
        Self {
            key: view.key.clone(),
            kind: ResourceKind::MaterializedView,
            remote_id: full_name.into(),
            fingerprint: None,
            source_key: Some(view.source_query_key.clone()),
            updated_at: Utc::now(),
        }
    }
}

/// Terminal state of a removed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terminal {
    /// Soft-deleted, recoverable by unarchiving
    Archived,
    /// Hard-deleted
    Deleted,
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archived => write!(f, "archived"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Per-key result of a reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Converged {
        remote_id: String,
        mode: Option<ResolveMode>,
        note: Option<String>,
    },
    Drifted {
        remote_id: String,
        reasons: BTreeSet<DriftReason>,
    },
    Missing,
    Skipped {
        reason: String,
    },
    Failed {
        cause: String,
    },
    Removed {
        terminal: Terminal,
    },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Outcome for a single key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyReport {
    pub key: String,
    pub kind: ResourceKind,
    pub outcome: Outcome,
}

impl KeyReport {
    pub fn new(key: impl Into<String>, kind: ResourceKind, outcome: Outcome) -> Self {
        Self {
            key: key.into(),
            kind,
            outcome,
        }
    }
}

/// Summary counts of a pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub converged: usize,
    pub drifted: usize,
    pub missing: usize,
    pub skipped: usize,
    pub failed: usize,
    pub removed: usize,
}

impl PassSummary {
    pub fn add_outcome(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Converged { .. } => self.converged += 1,
            Outcome::Drifted { .. } => self.drifted += 1,
            Outcome::Missing => self.missing += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::Failed { .. } => self.failed += 1,
            Outcome::Removed { .. } => self.removed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.converged + self.drifted + self.missing + self.skipped + self.failed + self.removed
    }
}

/// Everything a reconciliation pass did, key by key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub entries: Vec<KeyReport>,
    pub summary: PassSummary,
}

impl PassReport {
    pub fn push(&mut self, report: KeyReport) {
        self.summary.add_outcome(&report.outcome);
        self.entries.push(report);
    }

    pub fn get(&self, key: &str) -> Option<&KeyReport> {
        self.entries.iter().find(|r| r.key == key)
    }

    /// Aggregated per-key failures
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .filter_map(|r| match &r.outcome {
                Outcome::Failed { cause } => Some((r.key.as_str(), cause.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.summary.failed == 0
    }
}

/// Retry policy for remote calls
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Delay for a given attempt number (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Options for a reconciliation pass
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Worker threads per tier
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self { jobs: 4 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meaningful_ids() {
        assert!(is_meaningful_id("4242"));
        assert!(!is_meaningful_id(""));
        assert!(!is_meaningful_id("  "));
        assert!(!is_meaningful_id("0"));
    }

    #[test]
    fn test_remembered_id_filters_placeholders() {
        let decl = QueryDeclaration::new("q1", "Daily Count", "SELECT 1");
        assert_eq!(decl.remembered_id(), None);
        assert_eq!(decl.clone().with_remembered_id("0").remembered_id(), None);
        assert_eq!(
            decl.with_remembered_id(" 17 ").remembered_id(),
            Some("17")
        );
    }

    #[test]
    fn test_query_validation() {
        let ok = QueryDeclaration::new("q1", "Daily Count", "SELECT 1");
        assert!(ok.validate().is_ok());

        let no_name = QueryDeclaration::new("q1", "  ", "SELECT 1");
        assert!(matches!(
            no_name.validate(),
            Err(ConfigError::EmptyField { field: "display_name", .. })
        ));

        let no_body = QueryDeclaration::new("q1", "Daily Count", "\n");
        assert!(matches!(
            no_body.validate(),
            Err(ConfigError::EmptyField { field: "content", .. })
        ));
    }

    #[test]
    fn test_full_name() {
        let ns = Namespace::new("dune", "analytics");
        assert_eq!(ns.full_name("mv1"), "dune.analytics.mv1");
    }

    #[test]
    fn test_summary_counts() {
        let mut report = PassReport::default();
        report.push(KeyReport::new(
            "q1",
            ResourceKind::Query,
            Outcome::Converged {
                remote_id: "1".into(),
                mode: Some(ResolveMode::Created),
                note: None,
            },
        ));
        report.push(KeyReport::new(
            "mv1",
            ResourceKind::MaterializedView,
            Outcome::Failed {
                cause: "boom".into(),
            },
        ));

        assert_eq!(report.summary.converged, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.total(), 2);
        assert!(!report.is_success());
        assert_eq!(report.failures(), vec![("mv1", "boom")]);
    }

    #[test]
    fn test_retry_delay_backoff() {
        let config = RetryConfig::new(5, Duration::from_secs(1), 2.0);
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(30));
    }

    #[test]
    fn test_drift_verdict_display() {
        let verdict = DriftVerdict::Drift {
            reasons: [DriftReason::ScheduleMismatch, DriftReason::LinkedResourceMismatch]
                .into_iter()
                .collect(),
        };
        assert_eq!(
            verdict.to_string(),
            "drift (schedule_mismatch, linked_resource_mismatch)"
        );
    }
}
