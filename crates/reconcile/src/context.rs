//! Reconciliation context and provider traits
//!
//! The context carries the remote client (absent when no credentials are
//! configured), the pass-wide naming scope and the retry policy. Progress
//! reporting is injected through [`ProgressCallback`] so the engine does not
//! depend on any terminal UI.

use crate::client::RemoteClient;
use crate::error::{Error, RemoteResult, Result};
use crate::retry::{LogCallback, with_retry};
use crate::types::{KeyReport, Namespace, RetryConfig};

/// Processing tiers of a pass, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Queries,
    Views,
    Removals,
}

impl Tier {
    pub fn label(self) -> &'static str {
        match self {
            Self::Queries => "queries",
            Self::Views => "materialized views",
            Self::Removals => "removals",
        }
    }
}

/// Progress callback for reconciliation passes
pub trait ProgressCallback: Send {
    /// Called before a tier starts
    fn on_tier_start(&mut self, tier: Tier, count: usize);

    /// Called once per key after its tier finished
    fn on_key_complete(&mut self, report: &KeyReport);

    /// Called when a tier finished
    fn on_tier_complete(&mut self, tier: Tier);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_tier_start(&mut self, _tier: Tier, _count: usize) {}
    fn on_key_complete(&mut self, _report: &KeyReport) {}
    fn on_tier_complete(&mut self, _tier: Tier) {}
}

/// Context shared by every step of a pass
pub struct ReconcileContext<'a> {
    client: Option<&'a dyn RemoteClient>,
    /// Naming scope of materialized views
    pub namespace: Namespace,
    /// Retry policy for idempotent remote calls
    pub retry: RetryConfig,
}

impl<'a> ReconcileContext<'a> {
    /// Create a context; `client` is `None` when credentials are unavailable
    pub fn new(client: Option<&'a dyn RemoteClient>, namespace: Namespace) -> Self {
        Self {
            client,
            namespace,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.client.is_some()
    }

    /// Get the remote client, or error if credentials are unavailable
    pub fn require_client(&self) -> Result<&'a dyn RemoteClient> {
        self.client.ok_or(Error::Credentials)
    }

    /// Run an idempotent remote call under the retry policy
    pub fn call<T>(&self, operation: impl FnMut() -> RemoteResult<T>) -> RemoteResult<T> {
        with_retry(&self.retry, Some(&LogCallback), operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockClient;

    #[test]
    fn test_require_client_without_credentials() {
        let ctx = ReconcileContext::new(None, Namespace::new("dune", "team"));
        assert!(!ctx.has_credentials());
        assert!(matches!(ctx.require_client(), Err(Error::Credentials)));
    }

    #[test]
    fn test_require_client_with_credentials() {
        let mock = MockClient::default();
        let ctx = ReconcileContext::new(Some(&mock), Namespace::new("dune", "team"));
        assert!(ctx.has_credentials());
        assert!(ctx.require_client().is_ok());
    }
}
