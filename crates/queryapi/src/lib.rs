//! # Queryapi
//!
//! Blocking HTTP client for the hosted query and materialized view API,
//! implementing [`reconcile::RemoteClient`].
//!
//! ## Example
//!
//! ```no_run
//! use queryapi::{ApiClient, ClientConfig};
//! use reconcile::RemoteClient;
//! use std::time::Duration;
//!
//! let client = ApiClient::new(
//!     ClientConfig::new("my-api-key").with_timeout(Duration::from_secs(10)),
//! )
//! .unwrap();
//! let query = client.read_query("1001").unwrap();
//! println!("{} ({})", query.name, query.visibility);
//! ```
//!
//! ## Error classification
//!
//! | Response | Category |
//! |----------|----------|
//! | 2xx | success |
//! | 404 | not found |
//! | 408, 429, 5xx, connection failure | transport (retryable) |
//! | timeout | timeout (retryable) |
//! | other 4xx | logic |

pub mod client;
pub mod error;
pub mod wire;

pub use client::{ApiClient, ClientConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use error::{Error, Result};
