//! Remote API client capability
//!
//! The engine never talks HTTP itself. It consumes this trait, which an
//! HTTP implementation (or [`crate::mock::MockClient`] in tests) provides.
//! Every method maps to exactly one remote call.

use crate::error::RemoteResult;
use crate::types::{PerformanceTier, Visibility};

/// A query as read back from the remote side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteQuery {
    pub remote_id: String,
    pub name: String,
    pub content: String,
    pub archived: bool,
    pub visibility: Visibility,
}

/// A query listed by a name search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySummary {
    pub remote_id: String,
    pub name: String,
    pub archived: bool,
    pub visibility: Visibility,
}

/// Parameters of a materialized view upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRequest<'a> {
    /// Short name; the remote qualifies it with namespace and team
    pub name: &'a str,
    pub source_id: &'a str,
    pub schedule: &'a str,
    pub tier: PerformanceTier,
    pub visibility: Visibility,
}

/// Acknowledgement of a materialized view upsert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertAck {
    /// Present when the upsert triggered a refresh
    pub refresh_token: Option<String>,
}

/// A materialized view as read back from the remote side
///
/// Fields the remote does not expose are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteView {
    pub full_name: String,
    pub schedule: Option<String>,
    pub source_id: Option<String>,
}

/// Capability set of the remote API.
///
/// Lookups of objects that do not exist return
/// [`RemoteError::NotFound`](crate::error::RemoteError::NotFound).
pub trait RemoteClient: Send + Sync {
    /// Create a query and return its new id
    fn create_query(&self, name: &str, content: &str, visibility: Visibility)
    -> RemoteResult<String>;

    fn read_query(&self, remote_id: &str) -> RemoteResult<RemoteQuery>;

    /// Queries owned by the caller whose name matches `name`
    fn search_queries_by_name(&self, name: &str) -> RemoteResult<Vec<QuerySummary>>;

    fn update_query(&self, remote_id: &str, name: &str, content: &str) -> RemoteResult<()>;

    fn archive_query(&self, remote_id: &str) -> RemoteResult<()>;

    fn unarchive_query(&self, remote_id: &str) -> RemoteResult<()>;

    fn set_query_visibility(&self, remote_id: &str, visibility: Visibility) -> RemoteResult<()>;

    /// Create or replace a materialized view by name
    fn upsert_dependent(&self, request: &ViewRequest<'_>) -> RemoteResult<UpsertAck>;

    fn read_dependent(&self, full_name: &str) -> RemoteResult<RemoteView>;

    fn delete_dependent(&self, full_name: &str) -> RemoteResult<()>;
}
