//! # Reconcile
//!
//! Converges a declared set of remote analytical queries and their
//! materialized views against a third-party API that has no declarative
//! client of its own.
//!
//! ## Core Concepts
//!
//! - **Fingerprint**: short deterministic digest of normalized query text
//! - **Identity resolution**: remembered id, else exact name search, else create
//! - **Upsert**: one full update per query per pass, unarchiving first if needed
//! - **Dependent upsert**: materialized views, only after their source query converged
//! - **Drift detection**: `Match`, `Drift{reasons}`, `Missing` or `Unknown`
//! - **Destroy**: queries are archived, views are deleted; both idempotent
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{
//!     DeclarationSet, ExecuteOptions, MemoryStore, MockClient, Namespace,
//!     NoProgress, QueryDeclaration, ReconcileContext, ViewDeclaration, execute,
//! };
//!
//! let mut set = DeclarationSet::new();
//! set.add_query(QueryDeclaration::new("q1", "Daily Count", "SELECT 1"))?;
//! set.add_view(ViewDeclaration::new("mv1", "q1", "0 */1 * * *"))?;
//!
//! let client = MockClient::default();
//! let ctx = ReconcileContext::new(Some(&client), Namespace::new("dune", "team"));
//! let mut store = MemoryStore::new();
//!
//! let report = execute(&set, &mut store, &ctx, &ExecuteOptions::default(), &mut NoProgress)?;
//! assert!(report.is_success());
//! ```
//!
//! ## Provider Traits
//!
//! - [`RemoteClient`]: the remote API capability set
//! - [`StateStore`]: last-applied `key -> remote_id` records
//! - [`ProgressCallback`]: receives tier and key progress
//!
//! The crate does no I/O of its own; HTTP, files and terminals live with
//! the callers.

pub mod client;
pub mod context;
pub mod dependent;
pub mod destroy;
pub mod drift;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod identity;
pub mod mock;
pub mod planner;
pub mod retry;
pub mod store;
pub mod types;
pub mod upsert;

// Re-export main types at crate root
pub use client::{QuerySummary, RemoteClient, RemoteQuery, RemoteView, UpsertAck, ViewRequest};
pub use context::{NoProgress, ProgressCallback, ReconcileContext, Tier};
pub use error::{ConfigError, Error, ErrorCategory, RemoteError, RemoteResult, Result};
pub use executor::{StatusEntry, destroy_all, execute, status};
pub use fingerprint::fingerprint;
pub use mock::MockClient;
pub use planner::{DeclarationSet, Plan, PlanEntry, PlannedAction, plan};
pub use retry::{RetryCallback, with_retry};
pub use store::{MemoryStore, StateStore};
pub use types::{
    DriftReason, DriftVerdict, ExecuteOptions, KeyReport, Namespace, Outcome, PassReport,
    PassSummary, PerformanceTier, QueryDeclaration, RemoteObservation, ResolveMode,
    ResolvedResource, ResourceKind, ResourceRecord, RetryConfig, Terminal, ViewDeclaration,
    Visibility,
};
