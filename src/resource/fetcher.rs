//! Resource Fetcher
//!
//! Walks paginated list responses through `cf curl`, mapping each resource as
//! pages arrive.

use crate::cf::client::CfClient;
use crate::error::{Error, Result};
use futures::future::try_join_all;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One page of a list response
#[derive(Debug, Clone, Deserialize)]
pub struct ResourcePage {
    #[serde(default)]
    pub resources: Vec<Value>,
    /// Side-car resources keyed by relation, present with `include` or `fields`
    #[serde(default)]
    pub included: Option<Value>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub next: Option<Link>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub href: String,
}

impl ResourcePage {
    /// Link to the following page, if any
    pub fn next_href(&self) -> Option<&str> {
        self.pagination
            .as_ref()
            .and_then(|p| p.next.as_ref())
            .map(|link| link.href.as_str())
    }
}

/// Fetch every page starting at `initial_query`, mapping each resource
///
/// The mapper receives the resource and the page's `included` side-car. It
/// returns `None` to skip a resource. Resources in one page are mapped
/// concurrently and kept in server order; pages are fetched one after another.
/// Any failure aborts the walk and discards what was collected.
pub async fn fetch_all<T, F, Fut>(
    client: &CfClient,
    initial_query: &str,
    mapper: F,
    token: Option<&CancellationToken>,
) -> Result<Vec<T>>
where
    F: Fn(Value, Option<Arc<Value>>) -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let mut all_items = Vec::new();
    let mut next_query = Some(initial_query.to_string());
    let mut pages = 0usize;

    while let Some(query) = next_query.take() {
        let response = client.curl(&query, token).await?;
        let page: ResourcePage = serde_json::from_value(response)?;
        pages += 1;

        let included = page.included.clone().map(Arc::new);
        let mapped = try_join_all(
            page.resources
                .iter()
                .cloned()
                .map(|resource| mapper(resource, included.clone())),
        )
        .await?;
        all_items.extend(mapped.into_iter().flatten());

        next_query = page.next_href().map(relative_href).transpose()?;
    }

    tracing::debug!(
        "Fetched {} items in {} page(s) from {}",
        all_items.len(),
        pages,
        initial_query
    );

    Ok(all_items)
}

/// Fetch every resource as raw JSON
pub async fn fetch_all_resources(
    client: &CfClient,
    initial_query: &str,
    token: Option<&CancellationToken>,
) -> Result<Vec<Value>> {
    fetch_all(
        client,
        initial_query,
        |resource, _| async move { Ok(Some(resource)) },
        token,
    )
    .await
}

/// Reduce an absolute `next` link to the path and query `cf curl` expects
pub fn relative_href(href: &str) -> Result<String> {
    match url::Url::parse(href) {
        Ok(url) => Ok(match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        }),
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(href.to_string()),
        Err(e) => Err(Error::Json(format!("Invalid pagination link '{}': {}", href, e))),
    }
}
