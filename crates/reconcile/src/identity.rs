//! Identity resolution for declared queries
//!
//! The remote offers no stable foreign key, so the local `key -> remote_id`
//! mapping is primary and the remote name index is only a fallback:
//!
//! 1. a remembered id that still exists is reused (unarchived if needed),
//! 2. otherwise a query with the exact display name is adopted,
//! 3. otherwise a new query is created.
//!
//! A remembered id is abandoned only when the remote confirms it is gone.
//! Any other failure fails the key instead of falling through, so a flaky
//! read never makes a key switch to a different remote object.

use crate::client::{QuerySummary, RemoteClient};
use crate::context::ReconcileContext;
use crate::error::Result;
use crate::types::{QueryDeclaration, Resolution, ResolveMode};

/// Determine the authoritative remote id of a declared query
pub fn resolve(decl: &QueryDeclaration, ctx: &ReconcileContext<'_>) -> Result<Resolution> {
    decl.validate()?;
    let client = ctx.require_client()?;

    if let Some(remote_id) = decl.remembered_id() {
        match ctx.call(|| client.read_query(remote_id)) {
            Ok(remote) => {
                if remote.archived {
                    log::info!("{}: unarchiving query {}", decl.key, remote_id);
                    ctx.call(|| client.unarchive_query(remote_id))?;
                }
                return Ok(Resolution {
                    remote_id: remote_id.to_string(),
                    mode: ResolveMode::Reused,
                    archived: false,
                    visibility: remote.visibility,
                    note: None,
                });
            }
            Err(e) if e.is_not_found() => {
                log::warn!(
                    "{}: remembered query {} no longer exists, searching by name",
                    decl.key,
                    remote_id
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(found) = search_exact(decl, ctx, client)? {
        log::info!(
            "{}: adopted existing query {} named '{}'",
            decl.key,
            found.remote_id,
            decl.display_name
        );
        return Ok(found);
    }

    // Not retried: a create that timed out may still have happened, and the
    // next pass adopts it by name.
    match client.create_query(&decl.display_name, &decl.content, decl.visibility) {
        Ok(remote_id) => {
            log::info!("{}: created query {}", decl.key, remote_id);
            Ok(Resolution {
                remote_id,
                mode: ResolveMode::Created,
                archived: false,
                visibility: decl.visibility,
                note: None,
            })
        }
        Err(e) if e.is_name_collision() => {
            log::warn!("{}: create reported a name collision: {}", decl.key, e);
            match search_exact(decl, ctx, client)? {
                Some(mut found) => {
                    found.note = Some(format!(
                        "name collision on create, adopted query {}",
                        found.remote_id
                    ));
                    Ok(found)
                }
                None => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// First query whose name equals the display name exactly
fn search_exact(
    decl: &QueryDeclaration,
    ctx: &ReconcileContext<'_>,
    client: &dyn RemoteClient,
) -> Result<Option<Resolution>> {
    let candidates = ctx.call(|| client.search_queries_by_name(&decl.display_name))?;
    let matching: Vec<&QuerySummary> = candidates
        .iter()
        .filter(|q| q.name == decl.display_name)
        .collect();

    if matching.len() > 1 {
        log::warn!(
            "{}: {} remote queries named '{}', using {}",
            decl.key,
            matching.len(),
            decl.display_name,
            matching[0].remote_id
        );
    }

    Ok(matching.first().map(|q| Resolution {
        remote_id: q.remote_id.clone(),
        mode: ResolveMode::Found,
        archived: q.archived,
        visibility: q.visibility,
        note: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{RemoteQuery, RemoteView, UpsertAck, ViewRequest};
    use crate::error::{ConfigError, Error, RemoteError, RemoteResult};
    use crate::mock::{MockClient, Op};
    use crate::types::{Namespace, RetryConfig, Visibility};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx(mock: &MockClient) -> ReconcileContext<'_> {
        ReconcileContext::new(Some(mock), Namespace::new("dune", "team"))
            .with_retry(RetryConfig::no_retry())
    }

    fn daily_count() -> QueryDeclaration {
        QueryDeclaration::new("q1", "Daily Count", "SELECT 1")
    }

    #[test]
    fn test_creates_when_nothing_matches() {
        let mock = MockClient::default();
        let resolution = resolve(&daily_count(), &ctx(&mock)).unwrap();

        assert_eq!(resolution.mode, ResolveMode::Created);
        assert!(mock.query(&resolution.remote_id).is_some());
        assert_eq!(mock.ops(), vec![Op::SearchQueries, Op::CreateQuery]);
    }

    #[test]
    fn test_reuses_remembered_id_without_search() {
        let mock = MockClient::default();
        let first = resolve(&daily_count(), &ctx(&mock)).unwrap();
        mock.clear_calls();

        let again = daily_count().with_remembered_id(first.remote_id.clone());
        let second = resolve(&again, &ctx(&mock)).unwrap();

        assert_eq!(second.mode, ResolveMode::Reused);
        assert_eq!(second.remote_id, first.remote_id);
        assert_eq!(mock.count(Op::SearchQueries), 0);
        assert_eq!(mock.ops(), vec![Op::ReadQuery]);
    }

    #[test]
    fn test_unarchives_remembered_id_before_returning() {
        let mock = MockClient::default();
        let id = mock.insert_query("Daily Count", "SELECT 1");
        mock.set_archived(&id, true);

        let decl = daily_count().with_remembered_id(id.clone());
        let resolution = resolve(&decl, &ctx(&mock)).unwrap();

        assert_eq!(resolution.mode, ResolveMode::Reused);
        assert!(!resolution.archived);
        assert_eq!(mock.ops(), vec![Op::ReadQuery, Op::UnarchiveQuery]);
        assert!(!mock.query(&id).unwrap().archived);
    }

    #[test]
    fn test_falls_through_to_search_when_remembered_id_is_gone() {
        let mock = MockClient::default();
        let existing = mock.insert_query("Daily Count", "SELECT 1");

        let decl = daily_count().with_remembered_id("999999");
        let resolution = resolve(&decl, &ctx(&mock)).unwrap();

        assert_eq!(resolution.mode, ResolveMode::Found);
        assert_eq!(resolution.remote_id, existing);
        assert_eq!(mock.ops(), vec![Op::ReadQuery, Op::SearchQueries]);
    }

    #[test]
    fn test_transport_error_on_remembered_id_does_not_switch_identity() {
        let mock = MockClient::default();
        let remembered = mock.insert_query("Daily Count", "SELECT 1");
        mock.insert_query("Daily Count", "SELECT 1");
        mock.fail_next(Op::ReadQuery, RemoteError::transport("connection reset", None));

        let decl = daily_count().with_remembered_id(remembered);
        let err = resolve(&decl, &ctx(&mock)).unwrap_err();

        assert!(matches!(err, Error::Remote(RemoteError::Transport { .. })));
        assert_eq!(mock.count(Op::SearchQueries), 0);
        assert_eq!(mock.count(Op::CreateQuery), 0);
    }

    #[test]
    fn test_zero_remembered_id_is_ignored() {
        let mock = MockClient::default();
        let resolution = resolve(&daily_count().with_remembered_id("0"), &ctx(&mock)).unwrap();
        assert_eq!(resolution.mode, ResolveMode::Created);
        assert_eq!(mock.count(Op::ReadQuery), 0);
    }

    #[test]
    fn test_search_requires_exact_name() {
        let mock = MockClient::default();
        mock.insert_query("Daily Count v2", "SELECT 1");
        mock.insert_query("daily count", "SELECT 1");

        let resolution = resolve(&daily_count(), &ctx(&mock)).unwrap();
        assert_eq!(resolution.mode, ResolveMode::Created);
    }

    #[test]
    fn test_found_archived_query_is_flagged_for_upsert() {
        let mock = MockClient::default();
        let id = mock.insert_query("Daily Count", "SELECT 1");
        mock.set_archived(&id, true);

        let resolution = resolve(&daily_count(), &ctx(&mock)).unwrap();
        assert_eq!(resolution.mode, ResolveMode::Found);
        assert!(resolution.archived);
        assert_eq!(mock.count(Op::UnarchiveQuery), 0);
    }

    #[test]
    fn test_duplicate_names_take_first_match() {
        let mock = MockClient::default();
        let first = mock.insert_query("Daily Count", "SELECT 1");
        mock.insert_query("Daily Count", "SELECT 2");

        let resolution = resolve(&daily_count(), &ctx(&mock)).unwrap();
        assert_eq!(resolution.remote_id, first);
    }

    /// A client whose first name search misses, as if another writer created
    /// the query between our search and our create.
    struct RacingClient<'m> {
        inner: &'m MockClient,
        searches: AtomicUsize,
    }

    impl RemoteClient for RacingClient<'_> {
        fn create_query(&self, _: &str, _: &str, _: Visibility) -> RemoteResult<String> {
            Err(RemoteError::logic("query name already exists", Some(409)))
        }

        fn read_query(&self, remote_id: &str) -> RemoteResult<RemoteQuery> {
            self.inner.read_query(remote_id)
        }

        fn search_queries_by_name(&self, name: &str) -> RemoteResult<Vec<QuerySummary>> {
            if self.searches.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Vec::new())
            } else {
                self.inner.search_queries_by_name(name)
            }
        }

        fn update_query(&self, remote_id: &str, name: &str, content: &str) -> RemoteResult<()> {
            self.inner.update_query(remote_id, name, content)
        }

        fn archive_query(&self, remote_id: &str) -> RemoteResult<()> {
            self.inner.archive_query(remote_id)
        }

        fn unarchive_query(&self, remote_id: &str) -> RemoteResult<()> {
            self.inner.unarchive_query(remote_id)
        }

        fn set_query_visibility(&self, remote_id: &str, visibility: Visibility) -> RemoteResult<()> {
            self.inner.set_query_visibility(remote_id, visibility)
        }

        fn upsert_dependent(&self, request: &ViewRequest<'_>) -> RemoteResult<UpsertAck> {
            self.inner.upsert_dependent(request)
        }

        fn read_dependent(&self, full_name: &str) -> RemoteResult<RemoteView> {
            self.inner.read_dependent(full_name)
        }

        fn delete_dependent(&self, full_name: &str) -> RemoteResult<()> {
            self.inner.delete_dependent(full_name)
        }
    }

    #[test]
    fn test_name_collision_on_create_is_downgraded() {
        let mock = MockClient::default();
        let existing = mock.insert_query("Daily Count", "SELECT 1");
        let racing = RacingClient {
            inner: &mock,
            searches: AtomicUsize::new(0),
        };
        let ctx = ReconcileContext::new(Some(&racing), Namespace::new("dune", "team"))
            .with_retry(RetryConfig::no_retry());

        let resolution = resolve(&daily_count(), &ctx).unwrap();

        assert_eq!(resolution.mode, ResolveMode::Found);
        assert_eq!(resolution.remote_id, existing);
        assert!(resolution.note.unwrap().contains("name collision"));
    }

    #[test]
    fn test_name_collision_without_match_fails() {
        let mock = MockClient::default();
        mock.fail_next(Op::CreateQuery, RemoteError::logic("name already exists", Some(409)));
        let err = resolve(&daily_count(), &ctx(&mock)).unwrap_err();
        assert!(matches!(err, Error::Remote(RemoteError::Logic { .. })));
        assert_eq!(mock.count(Op::SearchQueries), 2);
    }

    #[test]
    fn test_other_logic_errors_on_create_fail() {
        let mock = MockClient::default();
        mock.fail_next(Op::CreateQuery, RemoteError::logic("syntax error", Some(400)));
        let err = resolve(&daily_count(), &ctx(&mock)).unwrap_err();
        assert!(matches!(err, Error::Remote(RemoteError::Logic { .. })));
    }

    #[test]
    fn test_empty_fields_rejected_before_remote_calls() {
        let mock = MockClient::default();
        let decl = QueryDeclaration::new("q1", "", "SELECT 1");
        let err = resolve(&decl, &ctx(&mock)).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::EmptyField { .. })));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_without_credentials() {
        let ctx = ReconcileContext::new(None, Namespace::new("dune", "team"));
        let err = resolve(&daily_count(), &ctx).unwrap_err();
        assert!(matches!(err, Error::Credentials));
    }
}
