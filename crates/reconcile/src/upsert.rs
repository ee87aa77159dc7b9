//! Upsert engine for queries
//!
//! Every pass pushes the full declared name and content, whether or not the
//! fingerprint changed. The remote may have been edited out-of-band, so a
//! local equality check is never trusted to skip the update.

use crate::context::ReconcileContext;
use crate::error::Result;
use crate::fingerprint::fingerprint;
use crate::types::{QueryDeclaration, Resolution, ResolvedResource};

/// Converge a resolved query to its declaration
///
/// Issues, in order: an unarchive if the resolved object is archived, exactly
/// one update, and a visibility change if the observed visibility differs
/// from the declared one.
pub fn converge(
    resolution: &Resolution,
    decl: &QueryDeclaration,
    ctx: &ReconcileContext<'_>,
) -> Result<ResolvedResource> {
    decl.validate()?;
    let client = ctx.require_client()?;
    let remote_id = resolution.remote_id.as_str();

    if resolution.archived {
        log::info!("{}: unarchiving query {} before update", decl.key, remote_id);
        ctx.call(|| client.unarchive_query(remote_id))?;
    }

    log::info!("{}: updating query {}", decl.key, remote_id);
    ctx.call(|| client.update_query(remote_id, &decl.display_name, &decl.content))?;

    if resolution.visibility != decl.visibility {
        log::info!(
            "{}: changing visibility of query {} from {} to {}",
            decl.key,
            remote_id,
            resolution.visibility,
            decl.visibility
        );
        ctx.call(|| client.set_query_visibility(remote_id, decl.visibility))?;
    }

    Ok(ResolvedResource {
        key: decl.key.clone(),
        remote_id: remote_id.to_string(),
        content_fingerprint: fingerprint(&decl.content),
        full_qualified_name: ResolvedResource::query_reference(remote_id),
        mode: resolution.mode,
        visibility: decl.visibility,
    })
}
