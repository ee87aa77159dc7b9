//! Request and response bodies of the HTTP API.

use reconcile::{QuerySummary, RemoteQuery, RemoteView, Visibility};
use serde::{Deserialize, Serialize};

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Serialize)]
pub struct CreateQueryRequest<'a> {
    pub name: &'a str,
    pub query_sql: &'a str,
    pub is_private: bool,
}

#[derive(Debug, Serialize)]
pub struct UpdateQueryRequest<'a> {
    pub name: &'a str,
    pub query_sql: &'a str,
}

#[derive(Debug, Serialize)]
pub struct UpsertViewRequest<'a> {
    pub name: &'a str,
    pub query_id: u64,
    pub cron_expression: &'a str,
    pub performance: &'a str,
    pub is_private: bool,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateQueryResponse {
    pub query_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct WireQuery {
    pub query_id: u64,
    pub name: String,
    #[serde(default)]
    pub query_sql: String,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Deserialize)]
pub struct QueryPage {
    #[serde(default)]
    pub queries: Vec<WireQuery>,
    #[serde(default)]
    pub next_offset: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpsertViewResponse {
    #[serde(default)]
    pub execution_id: Option<String>,
}

/// Materialized view as returned by the API; optional fields may be absent
#[derive(Debug, Deserialize)]
pub struct WireView {
    #[serde(default, alias = "id")]
    pub name: Option<String>,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub query_id: Option<u64>,
}

impl From<WireQuery> for RemoteQuery {
    fn from(q: WireQuery) -> Self {
        Self {
            remote_id: q.query_id.to_string(),
            name: q.name,
            content: q.query_sql,
            archived: q.is_archived,
            visibility: Visibility::from_private_flag(q.is_private),
        }
    }
}

impl From<WireQuery> for QuerySummary {
    fn from(q: WireQuery) -> Self {
        Self {
            remote_id: q.query_id.to_string(),
            name: q.name,
            archived: q.is_archived,
            visibility: Visibility::from_private_flag(q.is_private),
        }
    }
}

impl WireView {
    /// Convert, falling back to the requested name when the body omits it
    pub fn into_remote(self, requested: &str) -> RemoteView {
        RemoteView {
            full_name: self.name.unwrap_or_else(|| requested.to_string()),
            schedule: self.cron_expression.filter(|s| !s.trim().is_empty()),
            source_id: self.query_id.filter(|id| *id != 0).map(|id| id.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_conversion() {
        let wire: WireQuery = serde_json::from_str(
            r#"{"query_id": 1001, "name": "Daily Count", "query_sql": "SELECT 1",
                "is_archived": true, "is_private": false}"#,
        )
        .unwrap();
        let query = RemoteQuery::from(wire);

        assert_eq!(query.remote_id, "1001");
        assert_eq!(query.content, "SELECT 1");
        assert!(query.archived);
        assert_eq!(query.visibility, Visibility::Public);
    }

    #[test]
    fn test_query_defaults_when_fields_absent() {
        let wire: WireQuery = serde_json::from_str(r#"{"query_id": 7, "name": "q"}"#).unwrap();
        let summary = QuerySummary::from(wire);
        assert!(!summary.archived);
        assert_eq!(summary.visibility, Visibility::Public);
    }

    #[test]
    fn test_view_with_partial_fields() {
        let wire: WireView = serde_json::from_str(r#"{"id": "dune.team.mv1"}"#).unwrap();
        let view = wire.into_remote("dune.team.mv1");

        assert_eq!(view.full_name, "dune.team.mv1");
        assert!(view.schedule.is_none());
        assert!(view.source_id.is_none());
    }

    #[test]
    fn test_view_zero_query_id_is_unobserved() {
        let wire: WireView =
            serde_json::from_str(r#"{"cron_expression": "0 * * * *", "query_id": 0}"#).unwrap();
        let view = wire.into_remote("dune.team.mv1");

        assert_eq!(view.full_name, "dune.team.mv1");
        assert_eq!(view.schedule.as_deref(), Some("0 * * * *"));
        assert!(view.source_id.is_none());
    }

    #[test]
    fn test_upsert_request_shape() {
        let body = serde_json::to_value(UpsertViewRequest {
            name: "mv1",
            query_id: 1001,
            cron_expression: "0 */1 * * *",
            performance: "medium",
            is_private: true,
        })
        .unwrap();

        assert_eq!(body["query_id"], 1001);
        assert_eq!(body["performance"], "medium");
        assert_eq!(body["is_private"], true);
    }

    #[test]
    fn test_page_without_next_offset() {
        let page: QueryPage = serde_json::from_str(r#"{"queries": []}"#).unwrap();
        assert!(page.queries.is_empty());
        assert!(page.next_offset.is_none());
    }
}
