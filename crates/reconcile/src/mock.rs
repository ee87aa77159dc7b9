//! In-memory remote for tests and offline runs
//!
//! [`MockClient`] keeps queries and materialized views in memory, records
//! every call it receives and can be told to fail specific operations.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::client::{QuerySummary, RemoteClient, RemoteQuery, RemoteView, UpsertAck, ViewRequest};
use crate::error::{RemoteError, RemoteResult};
use crate::types::{Namespace, PerformanceTier, Visibility};

/// Remote operations, for call assertions and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateQuery,
    ReadQuery,
    SearchQueries,
    UpdateQuery,
    ArchiveQuery,
    UnarchiveQuery,
    SetVisibility,
    UpsertDependent,
    ReadDependent,
    DeleteDependent,
}

/// A recorded call: operation plus its primary argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockQuery {
    pub name: String,
    pub content: String,
    pub archived: bool,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockView {
    pub schedule: Option<String>,
    pub source_id: Option<String>,
    pub tier: PerformanceTier,
    pub refreshes: u32,
}

#[derive(Debug, Default)]
struct MockState {
    queries: BTreeMap<String, MockQuery>,
    views: BTreeMap<String, MockView>,
    next_id: u64,
    calls: Vec<Call>,
    failures: HashMap<Op, VecDeque<RemoteError>>,
}

/// In-memory implementation of [`RemoteClient`].
#[derive(Debug, Clone)]
pub struct MockClient {
    namespace: Namespace,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new(Namespace::new("dune", "team"))
    }
}

impl MockClient {
    /// Create an empty remote qualifying view names with `namespace`
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            state: Arc::new(Mutex::new(MockState {
                next_id: 1000,
                ..MockState::default()
            })),
        }
    }

    /// The same remote, seen by a caller that qualifies names with `namespace`
    pub fn with_namespace(&self, namespace: Namespace) -> Self {
        Self {
            namespace,
            state: Arc::clone(&self.state),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a query and return its id
    pub fn insert_query(&self, name: &str, content: &str) -> String {
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id.to_string();
        state.queries.insert(
            id.clone(),
            MockQuery {
                name: name.to_string(),
                content: content.to_string(),
                archived: false,
                visibility: Visibility::Private,
            },
        );
        id
    }

    /// Flip the archived flag of a seeded query
    pub fn set_archived(&self, remote_id: &str, archived: bool) {
        if let Some(query) = self.state().queries.get_mut(remote_id) {
            query.archived = archived;
        }
    }

    pub fn set_visibility(&self, remote_id: &str, visibility: Visibility) {
        if let Some(query) = self.state().queries.get_mut(remote_id) {
            query.visibility = visibility;
        }
    }

    /// Seed a view under its full qualified name
    pub fn insert_view(&self, full_name: &str, schedule: Option<&str>, source_id: Option<&str>) {
        self.state().views.insert(
            full_name.to_string(),
            MockView {
                schedule: schedule.map(str::to_string),
                source_id: source_id.map(str::to_string),
                tier: PerformanceTier::Medium,
                refreshes: 0,
            },
        );
    }

    /// Remove a query outright, as if deleted out-of-band
    pub fn purge_query(&self, remote_id: &str) {
        self.state().queries.remove(remote_id);
    }

    pub fn query(&self, remote_id: &str) -> Option<MockQuery> {
        self.state().queries.get(remote_id).cloned()
    }

    pub fn view(&self, full_name: &str) -> Option<MockView> {
        self.state().views.get(full_name).cloned()
    }

    pub fn query_count(&self) -> usize {
        self.state().queries.len()
    }

    /// Make the next call of `op` fail with `error`
    pub fn fail_next(&self, op: Op, error: RemoteError) {
        self.state().failures.entry(op).or_default().push_back(error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.state().calls.iter().map(|c| c.op).collect()
    }

    pub fn count(&self, op: Op) -> usize {
        self.state().calls.iter().filter(|c| c.op == op).count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Record the call and pop an injected failure, if any
    fn enter(&self, op: Op, target: &str) -> RemoteResult<MutexGuard<'_, MockState>> {
        let mut state = self.state();
        state.calls.push(Call {
            op,
            target: target.to_string(),
        });
        if let Some(error) = state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        Ok(state)
    }
}

impl RemoteClient for MockClient {
    fn create_query(
        &self,
        name: &str,
        content: &str,
        visibility: Visibility,
    ) -> RemoteResult<String> {
        let mut state = self.enter(Op::CreateQuery, name)?;
        state.next_id += 1;
        let id = state.next_id.to_string();
        state.queries.insert(
            id.clone(),
            MockQuery {
                name: name.to_string(),
                content: content.to_string(),
                archived: false,
                visibility,
            },
        );
        Ok(id)
    }

    fn read_query(&self, remote_id: &str) -> RemoteResult<RemoteQuery> {
        let state = self.enter(Op::ReadQuery, remote_id)?;
        state
            .queries
            .get(remote_id)
            .map(|q| RemoteQuery {
                remote_id: remote_id.to_string(),
                name: q.name.clone(),
                content: q.content.clone(),
                archived: q.archived,
                visibility: q.visibility,
            })
            .ok_or_else(|| RemoteError::not_found(format!("query {remote_id}")))
    }

    fn search_queries_by_name(&self, name: &str) -> RemoteResult<Vec<QuerySummary>> {
        let state = self.enter(Op::SearchQueries, name)?;
        Ok(state
            .queries
            .iter()
            .filter(|(_, q)| q.name == name)
            .map(|(id, q)| QuerySummary {
                remote_id: id.clone(),
                name: q.name.clone(),
                archived: q.archived,
                visibility: q.visibility,
            })
            .collect())
    }

    fn update_query(&self, remote_id: &str, name: &str, content: &str) -> RemoteResult<()> {
        let mut state = self.enter(Op::UpdateQuery, remote_id)?;
        let query = state
            .queries
            .get_mut(remote_id)
            .ok_or_else(|| RemoteError::not_found(format!("query {remote_id}")))?;
        if query.archived {
            return Err(RemoteError::logic("cannot update an archived query", Some(400)));
        }
        query.name = name.to_string();
        query.content = content.to_string();
        Ok(())
    }

    fn archive_query(&self, remote_id: &str) -> RemoteResult<()> {
        let mut state = self.enter(Op::ArchiveQuery, remote_id)?;
        let query = state
            .queries
            .get_mut(remote_id)
            .ok_or_else(|| RemoteError::not_found(format!("query {remote_id}")))?;
        query.archived = true;
        Ok(())
    }

    fn unarchive_query(&self, remote_id: &str) -> RemoteResult<()> {
        let mut state = self.enter(Op::UnarchiveQuery, remote_id)?;
        let query = state
            .queries
            .get_mut(remote_id)
            .ok_or_else(|| RemoteError::not_found(format!("query {remote_id}")))?;
        query.archived = false;
        Ok(())
    }

    fn set_query_visibility(&self, remote_id: &str, visibility: Visibility) -> RemoteResult<()> {
        let mut state = self.enter(Op::SetVisibility, remote_id)?;
        let query = state
            .queries
            .get_mut(remote_id)
            .ok_or_else(|| RemoteError::not_found(format!("query {remote_id}")))?;
        query.visibility = visibility;
        Ok(())
    }

    fn upsert_dependent(&self, request: &ViewRequest<'_>) -> RemoteResult<UpsertAck> {
        let full_name = self.namespace.full_name(request.name);
        let mut state = self.enter(Op::UpsertDependent, &full_name)?;
        if !state.queries.contains_key(request.source_id) {
            return Err(RemoteError::logic(
                format!("query {} does not exist", request.source_id),
                Some(400),
            ));
        }

        let desired = MockView {
            schedule: Some(request.schedule.to_string()),
            source_id: Some(request.source_id.to_string()),
            tier: request.tier,
            refreshes: 0,
        };

        // Unchanged parameters are acknowledged without a refresh
        match state.views.get_mut(&full_name) {
            Some(existing)
                if existing.schedule == desired.schedule
                    && existing.source_id == desired.source_id
                    && existing.tier == desired.tier =>
            {
                Ok(UpsertAck::default())
            }
            Some(existing) => {
                let refreshes = existing.refreshes + 1;
                *existing = MockView {
                    refreshes,
                    ..desired
                };
                Ok(UpsertAck {
                    refresh_token: Some(format!("refresh-{full_name}-{refreshes}")),
                })
            }
            None => {
                state.views.insert(
                    full_name.clone(),
                    MockView {
                        refreshes: 1,
                        ..desired
                    },
                );
                Ok(UpsertAck {
                    refresh_token: Some(format!("refresh-{full_name}-1")),
                })
            }
        }
    }

    fn read_dependent(&self, full_name: &str) -> RemoteResult<RemoteView> {
        let state = self.enter(Op::ReadDependent, full_name)?;
        state
            .views
            .get(full_name)
            .map(|v| RemoteView {
                full_name: full_name.to_string(),
                schedule: v.schedule.clone(),
                source_id: v.source_id.clone(),
            })
            .ok_or_else(|| RemoteError::not_found(format!("materialized view {full_name}")))
    }

    fn delete_dependent(&self, full_name: &str) -> RemoteResult<()> {
        let mut state = self.enter(Op::DeleteDependent, full_name)?;
        state
            .views
            .remove(full_name)
            .map(|_| ())
            .ok_or_else(|| RemoteError::not_found(format!("materialized view {full_name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_read() {
        let mock = MockClient::default();
        let id = mock
            .create_query("Daily Count", "SELECT 1", Visibility::Public)
            .unwrap();
        let query = mock.read_query(&id).unwrap();
        assert_eq!(query.name, "Daily Count");
        assert_eq!(query.visibility, Visibility::Public);
        assert!(!query.archived);
        assert_eq!(mock.ops(), vec![Op::CreateQuery, Op::ReadQuery]);
    }

    #[test]
    fn test_search_is_exact() {
        let mock = MockClient::default();
        mock.insert_query("Daily Count", "SELECT 1");
        mock.insert_query("Daily Count (old)", "SELECT 2");
        let hits = mock.search_queries_by_name("Daily Count").unwrap();
        assert_eq!(hits.len(), 1);
        assert!(mock.search_queries_by_name("daily count").unwrap().is_empty());
    }

    #[test]
    fn test_injected_failure_is_consumed_once() {
        let mock = MockClient::default();
        let id = mock.insert_query("q", "SELECT 1");
        mock.fail_next(Op::ReadQuery, RemoteError::timeout("read_query"));
        assert!(mock.read_query(&id).is_err());
        assert!(mock.read_query(&id).is_ok());
        assert_eq!(mock.count(Op::ReadQuery), 2);
    }

    #[test]
    fn test_upsert_unchanged_is_noop_ack() {
        let mock = MockClient::new(Namespace::new("dune", "analytics"));
        let id = mock.insert_query("q", "SELECT 1");
        let request = ViewRequest {
            name: "mv1",
            source_id: &id,
            schedule: "0 * * * *",
            tier: PerformanceTier::Medium,
            visibility: Visibility::Private,
        };
        let first = mock.upsert_dependent(&request).unwrap();
        let second = mock.upsert_dependent(&request).unwrap();
        assert!(first.refresh_token.is_some());
        assert!(second.refresh_token.is_none());
        assert_eq!(mock.view("dune.analytics.mv1").unwrap().refreshes, 1);
    }

    #[test]
    fn test_missing_objects_are_not_found() {
        let mock = MockClient::default();
        assert!(mock.read_query("1").unwrap_err().is_not_found());
        assert!(mock.archive_query("1").unwrap_err().is_not_found());
        assert!(mock.delete_dependent("a.b.c").unwrap_err().is_not_found());
    }
}
