//! Declaration sets and pass planning
//!
//! A [`DeclarationSet`] is validated as a whole before any remote call is
//! made. [`plan`] then derives what a pass would do from the set and the
//! last-applied state alone, so it can back a dry run.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::ConfigError;
use crate::store::StateStore;
use crate::types::{
    Namespace, QueryDeclaration, ResourceKind, ResourceRecord, ViewDeclaration, is_meaningful_id,
};

static VIEW_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").expect("valid view key regex"));

static CRON_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9*,/-]+$").expect("valid cron field regex"));

const CRON_FIELDS: usize = 5;

/// The desired state of one pass, keyed by declaration key
#[derive(Debug, Clone, Default)]
pub struct DeclarationSet {
    queries: BTreeMap<String, QueryDeclaration>,
    views: BTreeMap<String, ViewDeclaration>,
}

impl DeclarationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query; keys are unique across queries and views
    pub fn add_query(&mut self, decl: QueryDeclaration) -> Result<(), ConfigError> {
        self.ensure_unused(&decl.key)?;
        self.queries.insert(decl.key.clone(), decl);
        Ok(())
    }

    /// Add a materialized view; keys are unique across queries and views
    pub fn add_view(&mut self, view: ViewDeclaration) -> Result<(), ConfigError> {
        self.ensure_unused(&view.key)?;
        self.views.insert(view.key.clone(), view);
        Ok(())
    }

    fn ensure_unused(&self, key: &str) -> Result<(), ConfigError> {
        if self.contains(key) {
            return Err(ConfigError::DuplicateKey {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.queries.contains_key(key) || self.views.contains_key(key)
    }

    pub fn query(&self, key: &str) -> Option<&QueryDeclaration> {
        self.queries.get(key)
    }

    pub fn view(&self, key: &str) -> Option<&ViewDeclaration> {
        self.views.get(key)
    }

    pub fn queries(&self) -> impl Iterator<Item = &QueryDeclaration> {
        self.queries.values()
    }

    pub fn views(&self) -> impl Iterator<Item = &ViewDeclaration> {
        self.views.values()
    }

    pub fn len(&self) -> usize {
        self.queries.len() + self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty() && self.views.is_empty()
    }

    /// Kind of the declaration under `key`, if any
    pub fn kind_of(&self, key: &str) -> Option<ResourceKind> {
        if self.queries.contains_key(key) {
            Some(ResourceKind::Query)
        } else if self.views.contains_key(key) {
            Some(ResourceKind::MaterializedView)
        } else {
            None
        }
    }

    /// Reject the whole set on the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        for decl in self.queries.values() {
            if decl.key.trim().is_empty() {
                return Err(ConfigError::InvalidKey {
                    key: decl.key.clone(),
                    reason: "key is empty".to_string(),
                });
            }
            decl.validate()?;
        }

        for view in self.views.values() {
            if !VIEW_KEY.is_match(&view.key) {
                return Err(ConfigError::InvalidKey {
                    key: view.key.clone(),
                    reason: "materialized view keys may only contain [a-z0-9_]".to_string(),
                });
            }
            if !self.queries.contains_key(&view.source_query_key) {
                return Err(ConfigError::UnknownSourceQuery {
                    view: view.key.clone(),
                    query: view.source_query_key.clone(),
                });
            }
            validate_schedule(&view.key, &view.refresh_schedule)?;
        }

        Ok(())
    }
}

/// Check that a schedule is a 5-field cron expression
pub fn validate_schedule(view: &str, schedule: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidSchedule {
        view: view.to_string(),
        schedule: schedule.to_string(),
        reason,
    };

    let fields: Vec<&str> = schedule.split_whitespace().collect();
    if fields.len() != CRON_FIELDS {
        return Err(invalid(format!(
            "expected {CRON_FIELDS} fields, found {}",
            fields.len()
        )));
    }
    if let Some(field) = fields.iter().find(|f| !CRON_FIELD.is_match(f)) {
        return Err(invalid(format!("field '{field}' has unsupported characters")));
    }
    Ok(())
}

/// Remote id to try first for a query: a pinned id in the declaration wins
/// over the id remembered in the store
pub fn remembered_id(decl: &QueryDeclaration, store: &dyn StateStore) -> Option<String> {
    if let Some(pinned) = decl.remembered_id() {
        return Some(pinned.to_string());
    }
    store
        .get(&decl.key)
        .filter(|r| r.kind == ResourceKind::Query)
        .map(|r| r.remote_id.trim())
        .filter(|id| is_meaningful_id(id))
        .map(str::to_string)
}

/// What a pass will do for one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
    /// No remembered id: search by name, else create
    Adopt,
    /// Remembered id: reuse and update
    Refresh { remote_id: String },
    /// Create or replace a materialized view
    Upsert { full_name: String },
    /// No longer declared: archive a query or delete a view
    Remove { remote_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub key: String,
    pub kind: ResourceKind,
    #[serde(flatten)]
    pub action: PlannedAction,
}

/// Ordered actions of one pass: queries, views, then removals
#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    pub entries: Vec<PlanEntry>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn removals(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.action, PlannedAction::Remove { .. }))
    }

    pub fn get(&self, key: &str, kind: ResourceKind) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.key == key && e.kind == kind)
    }
}

/// Stored records whose remote object must go, views first
///
/// A record is stale when no declaration of its kind claims its key, or when
/// it is a view stored under a full name other than the one `namespace`
/// gives it now (the namespace or team changed since it was created).
pub fn stale_records<'s>(
    set: &DeclarationSet,
    store: &'s dyn StateStore,
    namespace: &Namespace,
) -> Vec<&'s ResourceRecord> {
    let mut stale: Vec<_> = store
        .records()
        .into_iter()
        .filter(|r| {
            set.kind_of(&r.key) != Some(r.kind)
                || (r.kind == ResourceKind::MaterializedView
                    && r.remote_id != namespace.full_name(&r.key))
        })
        .collect();
    stale.sort_by_key(|r| (r.kind != ResourceKind::MaterializedView, r.key.clone()));
    stale
}

/// Derive the actions of a pass without touching the remote
pub fn plan(
    set: &DeclarationSet,
    store: &dyn StateStore,
    namespace: &Namespace,
) -> Result<Plan, ConfigError> {
    set.validate()?;

    let mut entries = Vec::with_capacity(set.len());

    for decl in set.queries() {
        let action = match remembered_id(decl, store) {
            Some(remote_id) => PlannedAction::Refresh { remote_id },
            None => PlannedAction::Adopt,
        };
        entries.push(PlanEntry {
            key: decl.key.clone(),
            kind: ResourceKind::Query,
            action,
        });
    }

    for view in set.views() {
        entries.push(PlanEntry {
            key: view.key.clone(),
            kind: ResourceKind::MaterializedView,
            action: PlannedAction::Upsert {
                full_name: namespace.full_name(&view.key),
            },
        });
    }

    for record in stale_records(set, store, namespace) {
        entries.push(PlanEntry {
            key: record.key.clone(),
            kind: record.kind,
            action: PlannedAction::Remove {
                remote_id: record.remote_id.clone(),
            },
        });
    }

    Ok(Plan { entries })
}
