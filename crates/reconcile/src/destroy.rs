//! Destroy coordinator
//!
//! Queries are archived (recoverable), materialized views are deleted. Both
//! paths are idempotent: an object that is already gone counts as removed,
//! and so does a timeout after the call was issued.

use crate::context::ReconcileContext;
use crate::error::{RemoteResult, Result};
use crate::types::Terminal;

/// Archive a query that is no longer declared
pub fn remove_query(key: &str, remote_id: &str, ctx: &ReconcileContext<'_>) -> Result<Terminal> {
    let client = ctx.require_client()?;
    log::info!("{}: archiving query {}", key, remote_id);
    tolerate(key, remote_id, ctx.call(|| client.archive_query(remote_id)))?;
    Ok(Terminal::Archived)
}

/// Delete a materialized view that is no longer declared
pub fn remove_dependent(key: &str, full_name: &str, ctx: &ReconcileContext<'_>) -> Result<Terminal> {
    let client = ctx.require_client()?;
    log::info!("{}: deleting materialized view {}", key, full_name);
    tolerate(key, full_name, ctx.call(|| client.delete_dependent(full_name)))?;
    Ok(Terminal::Deleted)
}

/// Map already-gone and timed-out removals to success
fn tolerate(key: &str, target: &str, result: RemoteResult<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.category().is_ignorable_on_removal() => {
            log::warn!("{}: treating {} as removed: {}", key, target, e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, RemoteError};
    use crate::mock::{MockClient, Op};
    use crate::types::{Namespace, RetryConfig};

    fn ctx(mock: &MockClient) -> ReconcileContext<'_> {
        ReconcileContext::new(Some(mock), Namespace::new("dune", "team"))
            .with_retry(RetryConfig::no_retry())
    }

    #[test]
    fn test_archive_is_idempotent() {
        let mock = MockClient::default();
        let id = mock.insert_query("Daily Count", "SELECT 1");

        assert_eq!(remove_query("q1", &id, &ctx(&mock)).unwrap(), Terminal::Archived);
        assert_eq!(remove_query("q1", &id, &ctx(&mock)).unwrap(), Terminal::Archived);
        assert!(mock.query(&id).unwrap().archived);
    }

    #[test]
    fn test_archive_of_purged_query_succeeds_twice() {
        let mock = MockClient::default();
        let id = mock.insert_query("Daily Count", "SELECT 1");
        mock.purge_query(&id);

        assert!(remove_query("q1", &id, &ctx(&mock)).is_ok());
        assert!(remove_query("q1", &id, &ctx(&mock)).is_ok());
        assert_eq!(mock.count(Op::ArchiveQuery), 2);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mock = MockClient::default();
        mock.insert_view("dune.team.mv1", Some("0 * * * *"), Some("1001"));

        assert_eq!(
            remove_dependent("mv1", "dune.team.mv1", &ctx(&mock)).unwrap(),
            Terminal::Deleted
        );
        assert_eq!(
            remove_dependent("mv1", "dune.team.mv1", &ctx(&mock)).unwrap(),
            Terminal::Deleted
        );
        assert!(mock.view("dune.team.mv1").is_none());
    }

    #[test]
    fn test_timeout_after_issued_delete_is_success() {
        let mock = MockClient::default();
        mock.fail_next(Op::DeleteDependent, RemoteError::timeout("delete_dependent"));
        assert!(remove_dependent("mv1", "dune.team.mv1", &ctx(&mock)).is_ok());
        assert_eq!(mock.count(Op::DeleteDependent), 1);
    }

    #[test]
    fn test_other_errors_fail_the_key() {
        let mock = MockClient::default();
        let id = mock.insert_query("Daily Count", "SELECT 1");
        mock.fail_next(Op::ArchiveQuery, RemoteError::logic("forbidden", Some(403)));

        let err = remove_query("q1", &id, &ctx(&mock)).unwrap_err();
        assert!(matches!(err, Error::Remote(RemoteError::Logic { .. })));
        assert!(!mock.query(&id).unwrap().archived);
    }

    #[test]
    fn test_removal_needs_credentials() {
        let ctx = ReconcileContext::new(None, Namespace::new("dune", "team"));
        assert!(matches!(remove_query("q1", "1001", &ctx), Err(Error::Credentials)));
    }
}
