//! Resource query engine
//!
//! Everything between a caller's filter and a typed collection: composing the
//! query, walking pages, joining side-car resources, and polling
//! asynchronous operations.
//!
//! # Architecture
//!
//! - [`registry`] - v3 resource types and their filter allow-lists
//! - [`query`] - Filter/query model and query-string composition
//! - [`fetcher`] - Pagination walker with per-resource mapping
//! - [`poller`] - Create-then-poll state machine
//! - [`cache`] - Memoized secondary lookups
//! - [`json`] - Optional-typed accessors over payloads
//!
//! # Example
//!
//! ```ignore
//! use cf_tools::resource::{fetch_all_resources, resource_url, ensure_query, ResourceKind};
//!
//! async fn list_orgs(client: &cf_tools::CfClient) -> cf_tools::Result<Vec<serde_json::Value>> {
//!     let query = ensure_query(None);
//!     fetch_all_resources(client, &resource_url(ResourceKind::Organizations, &query), None).await
//! }
//! ```

pub mod cache;
pub mod fetcher;
pub mod json;
pub mod poller;
pub mod query;
pub mod registry;

pub use cache::ResourceCache;
pub use fetcher::{fetch_all, fetch_all_resources, ResourcePage};
pub use poller::{poll_until_ready, NoProgress, PollSettings, PollStatus, ProgressReporter};
pub use query::{
    compose_query, ensure_query, pad_query, pad_query_space, resource_url, validate_filters,
    Filter, FilterKey, FilterOp, OrderBy, QuerySpec, DEFAULT_PER_PAGE,
};
pub use registry::ResourceKind;
