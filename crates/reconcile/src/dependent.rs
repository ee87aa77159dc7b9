//! Upsert engine for materialized views
//!
//! A view is created or replaced by name through a single upsert call. It
//! can only run once its source query has a [`ResolvedResource`] in the
//! current pass.

use crate::client::ViewRequest;
use crate::context::ReconcileContext;
use crate::error::{Error, Result};
use crate::types::{ResolvedResource, ViewDeclaration, is_meaningful_id};

/// Converge a materialized view and return its full qualified name
pub fn converge(
    view: &ViewDeclaration,
    source: Option<&ResolvedResource>,
    ctx: &ReconcileContext<'_>,
) -> Result<String> {
    let unresolved = || Error::UnresolvedSource {
        view: view.key.clone(),
        query: view.source_query_key.clone(),
    };

    let source = source
        .filter(|s| s.key == view.source_query_key)
        .ok_or_else(unresolved)?;
    if !is_meaningful_id(source.remote_id.trim()) {
        return Err(unresolved());
    }

    let client = ctx.require_client()?;
    let request = ViewRequest {
        name: &view.key,
        source_id: source.remote_id.trim(),
        schedule: &view.refresh_schedule,
        tier: view.performance_tier,
        visibility: source.visibility,
    };

    log::info!(
        "{}: upserting materialized view on query {} ({}, {})",
        view.key,
        request.source_id,
        request.schedule,
        request.tier
    );
    let ack = ctx.call(|| client.upsert_dependent(&request))?;
    match ack.refresh_token {
        Some(token) => log::info!("{}: refresh triggered ({})", view.key, token),
        None => log::debug!("{}: upsert acknowledged without refresh", view.key),
    }

    Ok(ctx.namespace.full_name(&view.key))
}
