//! Pass executor - runs the engine tier by tier with parallelism
//!
//! Tiers run in a fixed order: queries, materialized views, removals. Keys
//! within a tier are independent and run on a worker pool; a failed key is
//! recorded in the report and never aborts its siblings.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;
use serde::Serialize;

use crate::context::{ProgressCallback, ReconcileContext, Tier};
use crate::error::{Error, Result};
use crate::planner::{DeclarationSet, remembered_id, stale_records};
use crate::store::StateStore;
use crate::types::{
    DriftVerdict, ExecuteOptions, KeyReport, Outcome, PassReport, QueryDeclaration,
    ResolvedResource, ResourceKind, ResourceRecord, Terminal, ViewDeclaration,
};
use crate::{dependent, destroy, drift, identity, upsert};

const NO_CREDENTIALS: &str = "credentials unavailable";

/// Run one reconciliation pass and update the store
///
/// Fails only for an invalid declaration set or a worker pool that cannot
/// start. Remote failures are per key and end up in the report.
pub fn execute<P: ProgressCallback>(
    set: &DeclarationSet,
    store: &mut dyn StateStore,
    ctx: &ReconcileContext<'_>,
    options: &ExecuteOptions,
    progress: &mut P,
) -> Result<PassReport> {
    set.validate()?;

    let stale: Vec<ResourceRecord> = stale_records(set, &*store, &ctx.namespace).into_iter().cloned().collect();
    let declared = set
        .queries()
        .map(|q| (q.key.as_str(), ResourceKind::Query))
        .chain(set.views().map(|v| (v.key.as_str(), ResourceKind::MaterializedView)));

    if !ctx.has_credentials() {
        log::warn!("{}, skipping all remote work", NO_CREDENTIALS);
        return Ok(skipped_report(declared, &stale));
    }

    let mut report = PassReport::default();

    // Tier 1: queries
    let queries: Vec<QueryDeclaration> = set
        .queries()
        .map(|decl| match remembered_id(decl, &*store) {
            Some(remote_id) => decl.clone().with_remembered_id(remote_id),
            None => decl.clone(),
        })
        .collect();

    let mut resolved: BTreeMap<String, ResolvedResource> = BTreeMap::new();
    if !queries.is_empty() {
        progress.on_tier_start(Tier::Queries, queries.len());
        let results = run_tier(&queries, options.jobs, |decl| converge_query(decl, ctx))?;

        let mut reports = Vec::with_capacity(results.len());
        for (decl, result) in queries.iter().zip(results) {
            let outcome = match result {
                Ok((resource, note)) => {
                    let outcome = Outcome::Converged {
                        remote_id: resource.remote_id.clone(),
                        mode: Some(resource.mode),
                        note,
                    };
                    resolved.insert(decl.key.clone(), resource);
                    outcome
                }
                Err(e) => {
                    log::warn!("{}: {}", decl.key, e);
                    Outcome::Failed {
                        cause: e.to_string(),
                    }
                }
            };
            reports.push(KeyReport::new(&decl.key, ResourceKind::Query, outcome));
        }
        finish_tier(Tier::Queries, reports, progress, &mut report);
    }

    // Tier 2: materialized views, only after every query settled
    let views: Vec<&ViewDeclaration> = set.views().collect();
    let mut converged_views: Vec<(&ViewDeclaration, String)> = Vec::new();
    if !views.is_empty() {
        progress.on_tier_start(Tier::Views, views.len());
        let results = run_tier(&views, options.jobs, |view| {
            converge_view(view, resolved.get(&view.source_query_key), ctx)
        })?;

        let mut reports = Vec::with_capacity(results.len());
        for (view, (full_name, outcome)) in views.iter().zip(results) {
            if let Outcome::Failed { cause } = &outcome {
                log::warn!("{}: {}", view.key, cause);
            }
            if let Some(full_name) = full_name {
                converged_views.push((*view, full_name));
            }
            reports.push(KeyReport::new(&view.key, ResourceKind::MaterializedView, outcome));
        }
        finish_tier(Tier::Views, reports, progress, &mut report);
    }

    // Tier 3: removals. A stale record pointing at an object another key
    // converged this pass changed owner and is only forgotten.
    let claimed: BTreeSet<(ResourceKind, &str)> = resolved
        .values()
        .map(|r| (ResourceKind::Query, r.remote_id.as_str()))
        .chain(
            converged_views
                .iter()
                .map(|(_, name)| (ResourceKind::MaterializedView, name.as_str())),
        )
        .collect();
    let (released, doomed): (Vec<&ResourceRecord>, Vec<&ResourceRecord>) = stale
        .iter()
        .partition(|r| claimed.contains(&(r.kind, r.remote_id.as_str())));
    let doomed: Vec<ResourceRecord> = doomed.into_iter().cloned().collect();

    let removed = remove_records(&doomed, ctx, options.jobs, progress, &mut report)?;
    let blocked: BTreeSet<&str> = doomed
        .iter()
        .map(|r| r.key.as_str())
        .filter(|key| !removed.iter().any(|k| k == key))
        .collect();

    for record in released {
        log::info!(
            "{}: {} {} is now managed under another key, forgetting without removal",
            record.key,
            record.kind,
            record.remote_id
        );
        store.forget(&record.key);
    }
    for key in &removed {
        store.forget(key);
    }

    // A key whose old object could not be removed keeps its old record so the
    // removal is retried next pass
    for resource in resolved.values() {
        if blocked.contains(resource.key.as_str()) {
            log::warn!("{}: previous object not removed, record left unchanged", resource.key);
            continue;
        }
        store.save(ResourceRecord::query(resource));
    }
    for (view, full_name) in converged_views {
        if blocked.contains(view.key.as_str()) {
            log::warn!("{}: previous object not removed, record left unchanged", view.key);
            continue;
        }
        store.save(ResourceRecord::view(view, full_name));
    }

    Ok(report)
}

/// Tear down every resource in the store, views first
pub fn destroy_all<P: ProgressCallback>(
    store: &mut dyn StateStore,
    ctx: &ReconcileContext<'_>,
    options: &ExecuteOptions,
    progress: &mut P,
) -> Result<PassReport> {
    let records: Vec<ResourceRecord> = stale_records(&DeclarationSet::new(), &*store, &ctx.namespace)
        .into_iter()
        .cloned()
        .collect();

    if !ctx.has_credentials() {
        log::warn!("{}, nothing removed", NO_CREDENTIALS);
        return Ok(skipped_report(std::iter::empty(), &records));
    }

    let mut report = PassReport::default();
    for key in remove_records(&records, ctx, options.jobs, progress, &mut report)? {
        store.forget(&key);
    }
    Ok(report)
}

/// Read-only drift report for one declared key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub key: String,
    pub kind: ResourceKind,
    /// Query id or view name that was checked
    pub remote_id: Option<String>,
    /// Verdict, or the error that prevented the check
    pub check: std::result::Result<DriftVerdict, String>,
}

/// Check every declared key against the remote without changing anything
///
/// Missing credentials degrade every verdict to `Unknown`.
pub fn status(
    set: &DeclarationSet,
    store: &dyn StateStore,
    ctx: &ReconcileContext<'_>,
    options: &ExecuteOptions,
) -> Result<Vec<StatusEntry>> {
    set.validate()?;

    let queries: Vec<(&QueryDeclaration, Option<String>)> = set
        .queries()
        .map(|decl| (decl, remembered_id(decl, store)))
        .collect();
    let source_ids: BTreeMap<&str, Option<&String>> = queries
        .iter()
        .map(|(decl, id)| (decl.key.as_str(), id.as_ref()))
        .collect();

    let mut entries = run_tier(&queries, options.jobs, |(decl, remote_id)| {
        let check = match remote_id {
            _ if !ctx.has_credentials() => Ok(DriftVerdict::Unknown),
            None => Ok(DriftVerdict::Missing),
            Some(id) => drift::check_query(id, ctx).map_err(|e| e.to_string()),
        };
        StatusEntry {
            key: decl.key.clone(),
            kind: ResourceKind::Query,
            remote_id: remote_id.clone(),
            check,
        }
    })?;

    let views: Vec<&ViewDeclaration> = set.views().collect();
    entries.extend(run_tier(&views, options.jobs, |view| {
        let full_name = ctx.namespace.full_name(&view.key);
        let source_id = source_ids
            .get(view.source_query_key.as_str())
            .copied()
            .flatten()
            .map(String::as_str);
        let check = drift::check(&full_name, Some(view.refresh_schedule.as_str()), source_id, ctx)
            .map_err(|e| e.to_string());
        StatusEntry {
            key: view.key.clone(),
            kind: ResourceKind::MaterializedView,
            remote_id: Some(full_name),
            check,
        }
    })?);

    Ok(entries)
}

/// Resolve and converge one query
fn converge_query(
    decl: &QueryDeclaration,
    ctx: &ReconcileContext<'_>,
) -> Result<(ResolvedResource, Option<String>)> {
    let resolution = identity::resolve(decl, ctx)?;
    let resource = upsert::converge(&resolution, decl, ctx)?;
    Ok((resource, resolution.note))
}

/// Converge one view and check it for drift
///
/// Returns the full qualified name when the upsert succeeded.
fn converge_view(
    view: &ViewDeclaration,
    source: Option<&ResolvedResource>,
    ctx: &ReconcileContext<'_>,
) -> (Option<String>, Outcome) {
    let full_name = match dependent::converge(view, source, ctx) {
        Ok(full_name) => full_name,
        Err(e) => {
            return (
                None,
                Outcome::Failed {
                    cause: e.to_string(),
                },
            );
        }
    };

    let source_id = source.map(|s| s.remote_id.as_str());
    let outcome = match drift::check(&full_name, Some(view.refresh_schedule.as_str()), source_id, ctx) {
        Ok(DriftVerdict::Match | DriftVerdict::Unknown) => Outcome::Converged {
            remote_id: full_name.clone(),
            mode: None,
            note: None,
        },
        Ok(DriftVerdict::Drift { reasons }) => Outcome::Drifted {
            remote_id: full_name.clone(),
            reasons,
        },
        Ok(DriftVerdict::Missing) => Outcome::Missing,
        Err(e) => Outcome::Failed {
            cause: format!("drift check failed: {e}"),
        },
    };
    (Some(full_name), outcome)
}

/// Remove records (views, then queries) and return the keys that are gone
fn remove_records<P: ProgressCallback>(
    records: &[ResourceRecord],
    ctx: &ReconcileContext<'_>,
    jobs: usize,
    progress: &mut P,
    report: &mut PassReport,
) -> Result<Vec<String>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    progress.on_tier_start(Tier::Removals, records.len());
    let (views, queries): (Vec<&ResourceRecord>, Vec<&ResourceRecord>) = records
        .iter()
        .partition(|r| r.kind == ResourceKind::MaterializedView);

    let mut removed = Vec::new();
    let mut reports = Vec::with_capacity(records.len());
    for batch in [views, queries] {
        let results = run_tier(&batch, jobs, |record| remove_record(record, ctx))?;
        for (record, result) in batch.iter().zip(results) {
            let outcome = match result {
                Ok(terminal) => {
                    removed.push(record.key.clone());
                    Outcome::Removed { terminal }
                }
                Err(e) => {
                    log::warn!("{}: {}", record.key, e);
                    Outcome::Failed {
                        cause: e.to_string(),
                    }
                }
            };
            reports.push(KeyReport::new(&record.key, record.kind, outcome));
        }
    }
    finish_tier(Tier::Removals, reports, progress, report);
    Ok(removed)
}

fn remove_record(record: &ResourceRecord, ctx: &ReconcileContext<'_>) -> Result<Terminal> {
    match record.kind {
        ResourceKind::Query => destroy::remove_query(&record.key, &record.remote_id, ctx),
        ResourceKind::MaterializedView => {
            destroy::remove_dependent(&record.key, &record.remote_id, ctx)
        }
    }
}

fn skipped_report<'k>(
    declared: impl Iterator<Item = (&'k str, ResourceKind)>,
    stale: &'k [ResourceRecord],
) -> PassReport {
    let mut report = PassReport::default();
    let stale = stale.iter().map(|r| (r.key.as_str(), r.kind));
    for (key, kind) in declared.chain(stale) {
        report.push(KeyReport::new(
            key,
            kind,
            Outcome::Skipped {
                reason: NO_CREDENTIALS.to_string(),
            },
        ));
    }
    report
}

fn finish_tier<P: ProgressCallback>(
    tier: Tier,
    reports: Vec<KeyReport>,
    progress: &mut P,
    report: &mut PassReport,
) {
    for key_report in reports {
        progress.on_key_complete(&key_report);
        report.push(key_report);
    }
    progress.on_tier_complete(tier);
}

/// Run `work` over `items` on a pool of `jobs` threads, keeping input order
fn run_tier<T, R, F>(items: &[T], jobs: usize, work: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if jobs <= 1 || items.len() <= 1 {
        return Ok(items.iter().map(work).collect());
    }

    let results: Arc<Mutex<Vec<(usize, R)>>> =
        Arc::new(Mutex::new(Vec::with_capacity(items.len())));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| Error::Pool(e.to_string()))?;

    pool.install(|| {
        items.par_iter().enumerate().for_each(|(index, item)| {
            let result = work(item);
            results
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((index, result));
        });
    });

    let mut results = Arc::try_unwrap(results)
        .map_err(|_| Error::Pool("worker results still shared".to_string()))?
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);
    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, result)| result).collect())
}
