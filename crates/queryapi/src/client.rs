//! HTTP implementation of [`RemoteClient`].
//!
//! Every call goes through one `ureq` agent with a global timeout, so no
//! request can block longer than the configured bound. Status codes are not
//! turned into errors by `ureq`; [`crate::error::classify_status`] decides.

use std::time::Duration;

use reconcile::{
    QuerySummary, RemoteClient, RemoteError, RemoteQuery, RemoteResult, RemoteView, UpsertAck,
    ViewRequest, Visibility,
};
use serde::de::DeserializeOwned;
use ureq::Body;
use ureq::http::Response;

use crate::error::{Error, Result, classify_status, classify_transport, error_message};
use crate::wire::{
    CreateQueryRequest, CreateQueryResponse, QueryPage, UpdateQueryRequest, UpsertViewRequest,
    UpsertViewResponse, WireQuery, WireView,
};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.dune.com";

/// Default bound for a single call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size used when listing queries.
const PAGE_SIZE: u64 = 100;

/// Upper bound on pages fetched by one name search.
const MAX_PAGES: u64 = 50;

const USER_AGENT: &str = concat!("querysync/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Blocking client for the query and materialized view API.
pub struct ApiClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl ApiClient {
    /// Build a client; fails on a blank key or a non-http(s) base URL.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let api_key = config.api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(Error::EmptyApiKey);
        }

        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(Error::InvalidBaseUrl(config.base_url));
        }

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            agent,
            base_url,
            api_key,
        })
    }

    /// Get the API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn query_url(&self, remote_id: &str) -> String {
        format!("{}/api/v1/query/{}", self.base_url, remote_id)
    }

    fn query_action_url(&self, remote_id: &str, action: &str) -> String {
        format!("{}/{}", self.query_url(remote_id), action)
    }

    fn create_query_url(&self) -> String {
        format!("{}/api/v1/query", self.base_url)
    }

    fn queries_url(&self, offset: u64) -> String {
        format!(
            "{}/api/v1/queries?limit={}&offset={}",
            self.base_url, PAGE_SIZE, offset
        )
    }

    fn views_url(&self) -> String {
        format!("{}/api/v1/materialized-views", self.base_url)
    }

    fn view_url(&self, full_name: &str) -> String {
        format!("{}/{}", self.views_url(), full_name)
    }

    /// POST to a query action endpoint such as `archive`.
    fn query_action(&self, remote_id: &str, action: &str) -> RemoteResult<()> {
        let what = format!("query {remote_id}");
        parse_id(remote_id)?;
        log::debug!("POST {} ({})", action, what);
        let result = self
            .agent
            .post(&self.query_action_url(remote_id, action))
            .header("X-Dune-API-Key", &self.api_key)
            .header("User-Agent", USER_AGENT)
            .send_empty();
        check(action, &what, result).map(drop)
    }
}

/// Remote query ids are numeric on the wire.
fn parse_id(remote_id: &str) -> RemoteResult<u64> {
    remote_id
        .trim()
        .parse()
        .map_err(|_| RemoteError::logic(format!("invalid query id '{remote_id}'"), None))
}

/// Turn a raw call result into a 2xx response or a classified error.
fn check(
    operation: &str,
    what: &str,
    result: std::result::Result<Response<Body>, ureq::Error>,
) -> RemoteResult<Response<Body>> {
    let mut response = result.map_err(|e| classify_transport(operation, e))?;
    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(response);
    }

    let body = response.body_mut().read_to_string().unwrap_or_default();
    let err = classify_status(status, what, &error_message(&body));
    log::debug!("{} failed: {}", operation, err);
    Err(err)
}

/// Decode a JSON response body.
fn decode<T: DeserializeOwned>(operation: &str, mut response: Response<Body>) -> RemoteResult<T> {
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| classify_transport(operation, e))?;
    serde_json::from_str(&body)
        .map_err(|e| RemoteError::logic(format!("{operation}: invalid response: {e}"), None))
}

impl RemoteClient for ApiClient {
    fn create_query(
        &self,
        name: &str,
        content: &str,
        visibility: Visibility,
    ) -> RemoteResult<String> {
        let body = CreateQueryRequest {
            name,
            query_sql: content,
            is_private: visibility.is_private(),
        };
        let result = self
            .agent
            .post(&self.create_query_url())
            .header("X-Dune-API-Key", &self.api_key)
            .header("User-Agent", USER_AGENT)
            .send_json(&body);
        let response = check("create_query", &format!("query '{name}'"), result)?;
        let created: CreateQueryResponse = decode("create_query", response)?;
        Ok(created.query_id.to_string())
    }

    fn read_query(&self, remote_id: &str) -> RemoteResult<RemoteQuery> {
        parse_id(remote_id)?;
        let result = self
            .agent
            .get(&self.query_url(remote_id))
            .header("X-Dune-API-Key", &self.api_key)
            .header("User-Agent", USER_AGENT)
            .call();
        let response = check("read_query", &format!("query {remote_id}"), result)?;
        let query: WireQuery = decode("read_query", response)?;
        Ok(query.into())
    }

    fn search_queries_by_name(&self, name: &str) -> RemoteResult<Vec<QuerySummary>> {
        let mut matches = Vec::new();
        let mut offset = 0;

        for _ in 0..MAX_PAGES {
            let result = self
                .agent
                .get(&self.queries_url(offset))
                .header("X-Dune-API-Key", &self.api_key)
                .header("User-Agent", USER_AGENT)
                .call();
            let response = check("search_queries", "query list", result)?;
            let page: QueryPage = decode("search_queries", response)?;

            matches.extend(
                page.queries
                    .into_iter()
                    .filter(|q| q.name == name)
                    .map(QuerySummary::from),
            );

            match page.next_offset {
                Some(next) if next > offset => offset = next,
                _ => return Ok(matches),
            }
        }

        log::warn!(
            "stopped searching for '{}' after {} pages of queries",
            name,
            MAX_PAGES
        );
        Ok(matches)
    }

    fn update_query(&self, remote_id: &str, name: &str, content: &str) -> RemoteResult<()> {
        parse_id(remote_id)?;
        let body = UpdateQueryRequest {
            name,
            query_sql: content,
        };
        let result = self
            .agent
            .patch(&self.query_url(remote_id))
            .header("X-Dune-API-Key", &self.api_key)
            .header("User-Agent", USER_AGENT)
            .send_json(&body);
        check("update_query", &format!("query {remote_id}"), result).map(drop)
    }

    fn archive_query(&self, remote_id: &str) -> RemoteResult<()> {
        self.query_action(remote_id, "archive")
    }

    fn unarchive_query(&self, remote_id: &str) -> RemoteResult<()> {
        self.query_action(remote_id, "unarchive")
    }

    fn set_query_visibility(&self, remote_id: &str, visibility: Visibility) -> RemoteResult<()> {
        let action = match visibility {
            Visibility::Private => "private",
            Visibility::Public => "unprivate",
        };
        self.query_action(remote_id, action)
    }

    fn upsert_dependent(&self, request: &ViewRequest<'_>) -> RemoteResult<UpsertAck> {
        let body = UpsertViewRequest {
            name: request.name,
            query_id: parse_id(request.source_id)?,
            cron_expression: request.schedule,
            performance: request.tier.as_str(),
            is_private: request.visibility.is_private(),
        };
        let result = self
            .agent
            .post(&self.views_url())
            .header("X-Dune-API-Key", &self.api_key)
            .header("User-Agent", USER_AGENT)
            .send_json(&body);
        let what = format!("materialized view {}", request.name);
        let response = check("upsert_materialized_view", &what, result)?;
        let ack: UpsertViewResponse = decode("upsert_materialized_view", response)?;
        Ok(UpsertAck {
            refresh_token: ack.execution_id,
        })
    }

    fn read_dependent(&self, full_name: &str) -> RemoteResult<RemoteView> {
        let result = self
            .agent
            .get(&self.view_url(full_name))
            .header("X-Dune-API-Key", &self.api_key)
            .header("User-Agent", USER_AGENT)
            .call();
        let what = format!("materialized view {full_name}");
        let response = check("read_materialized_view", &what, result)?;
        let view: WireView = decode("read_materialized_view", response)?;
        Ok(view.into_remote(full_name))
    }

    fn delete_dependent(&self, full_name: &str) -> RemoteResult<()> {
        let result = self
            .agent
            .delete(&self.view_url(full_name))
            .header("X-Dune-API-Key", &self.api_key)
            .header("User-Agent", USER_AGENT)
            .call();
        let what = format!("materialized view {full_name}");
        check("delete_materialized_view", &what, result).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::PerformanceTier;

    fn client() -> ApiClient {
        ApiClient::new(ClientConfig::new("secret")).unwrap()
    }

    #[test]
    fn test_default_base_url() {
        assert_eq!(client().base_url(), "https://api.dune.com");
    }

    #[test]
    fn test_custom_base_url_trailing_slash() {
        let client =
            ApiClient::new(ClientConfig::new("secret").with_base_url("http://localhost:8080/"))
                .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.create_query_url(), "http://localhost:8080/api/v1/query");
    }

    #[test]
    fn test_query_urls() {
        let client = client();
        assert_eq!(client.query_url("1001"), "https://api.dune.com/api/v1/query/1001");
        assert_eq!(
            client.query_action_url("1001", "archive"),
            "https://api.dune.com/api/v1/query/1001/archive"
        );
        assert_eq!(
            client.queries_url(200),
            "https://api.dune.com/api/v1/queries?limit=100&offset=200"
        );
    }

    #[test]
    fn test_view_urls() {
        let client = client();
        assert_eq!(
            client.view_url("dune.team.mv1"),
            "https://api.dune.com/api/v1/materialized-views/dune.team.mv1"
        );
    }

    #[test]
    fn test_empty_api_key_rejected() {
        assert!(matches!(
            ApiClient::new(ClientConfig::new("  ")),
            Err(Error::EmptyApiKey)
        ));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = ClientConfig::new("secret").with_base_url("api.dune.com");
        assert!(matches!(ApiClient::new(config), Err(Error::InvalidBaseUrl(_))));
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id(" 1001 ").unwrap(), 1001);
        let err = parse_id("query_1001").unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_non_numeric_ids_fail_before_any_request() {
        let client = client();
        assert!(client.read_query("abc").is_err());
        assert!(client.archive_query("abc").is_err());

        let request = ViewRequest {
            name: "mv1",
            source_id: "",
            schedule: "0 * * * *",
            tier: PerformanceTier::Medium,
            visibility: Visibility::Private,
        };
        assert!(client.upsert_dependent(&request).is_err());
    }
}
